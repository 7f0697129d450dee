//! Parameter substitution inside a script template.
//!
//! Statements look like `<name> = <value>;`. Matching is a literal substring
//! search, so a name that is a prefix of another name (or appears in a
//! comment first) rewrites the wrong statement. Swap the [`StatementLocator`]
//! to change that.

use crate::error::SweepError;
use anyhow::{Context, Result};
use std::ops::Range;
use std::path::{Path, PathBuf};

const TERMINATOR: char = ';';

/// Finds the span of a parameter's statement, excluding the terminator.
pub trait StatementLocator: Send + Sync {
    fn locate(&self, content: &str, param: &str) -> Result<Range<usize>, SweepError>;
}

/// First literal occurrence of the parameter name up to the next `;`.
///
/// A match at byte offset 0 counts as "not found", so templates need a
/// leading header or comment line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubstringLocator;

impl StatementLocator for SubstringLocator {
    fn locate(&self, content: &str, param: &str) -> Result<Range<usize>, SweepError> {
        let start = match content.find(param) {
            Some(pos) if pos > 0 => pos,
            _ => {
                return Err(SweepError::MalformedTemplate {
                    param: param.to_string(),
                })
            }
        };
        let end = content[start..]
            .find(TERMINATOR)
            .map(|off| start + off)
            .ok_or_else(|| SweepError::UnterminatedStatement {
                param: param.to_string(),
            })?;
        Ok(start..end)
    }
}

/// Rewrite `param`'s statement to `param = value`, keeping everything else.
pub fn substitute(content: &str, param: &str, value: &str) -> Result<String, SweepError> {
    substitute_with(&SubstringLocator, content, param, value)
}

pub fn substitute_with(
    locator: &dyn StatementLocator,
    content: &str,
    param: &str,
    value: &str,
) -> Result<String, SweepError> {
    let span = locator.locate(content, param)?;
    let mut out = String::with_capacity(content.len() + value.len());
    out.push_str(&content[..span.start]);
    out.push_str(param);
    out.push_str(" = ");
    out.push_str(value);
    out.push_str(&content[span.end..]);
    Ok(out)
}

/// Script template, read once and never modified.
#[derive(Debug, Clone)]
pub struct Template {
    pub path: PathBuf,
    text: String,
}

impl Template {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read template {}", path.display()))?;
        Ok(Self::new(path, text))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply each `(param, value)` pair in order to a fresh copy of the template.
    pub fn render(
        &self,
        locator: &dyn StatementLocator,
        assignments: &[(&str, &str)],
    ) -> Result<String, SweepError> {
        let mut script = self.text.clone();
        for (param, value) in assignments {
            script = substitute_with(locator, &script, param, value)?;
        }
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_only_the_matched_statement() {
        let out = substitute("A = 1; B = 2;", "B", "5").unwrap();
        assert_eq!(out, "A = 1; B = 5;");
    }

    #[test]
    fn keeps_text_around_multiline_statement() {
        let src = "%header\nGMAT Thrust = 0.004;\nGMAT Other = 'a';\n";
        let out = substitute(src, "GMAT Thrust", "0.0012").unwrap();
        assert_eq!(out, "%header\nGMAT Thrust = 0.0012;\nGMAT Other = 'a';\n");
    }

    #[test]
    fn missing_parameter_is_malformed_template() {
        let err = substitute("A = 1; B = 2;", "C", "5").unwrap_err();
        assert!(matches!(err, SweepError::MalformedTemplate { ref param } if param == "C"));
    }

    #[test]
    fn match_at_offset_zero_counts_as_missing() {
        let err = substitute("A = 1; B = 2;", "A", "5").unwrap_err();
        assert!(matches!(err, SweepError::MalformedTemplate { .. }));
    }

    #[test]
    fn no_terminator_is_unterminated_statement() {
        let err = substitute("x A = 1; B = 2", "B", "5").unwrap_err();
        assert!(matches!(err, SweepError::UnterminatedStatement { ref param } if param == "B"));
    }

    #[test]
    fn substituting_twice_is_stable() {
        let once = substitute("A = 1; B = 2;", "B", "5").unwrap();
        let twice = substitute(&once, "B", "5").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn prefix_names_hit_the_first_occurrence() {
        // Known limitation of substring matching.
        let out = substitute("x ThrustMax = 9; Thrust = 1;", "Thrust", "2").unwrap();
        assert_eq!(out, "x Thrust = 2; Thrust = 1;");
    }

    #[test]
    fn render_applies_assignments_in_order() {
        let tpl = Template::new("t.script", "% t\nThrust = 0.001; File = 'x';");
        let out = tpl
            .render(&SubstringLocator, &[("Thrust", "0.002"), ("File", "'out1.txt'")])
            .unwrap();
        assert_eq!(out, "% t\nThrust = 0.002; File = 'out1.txt';");
        assert_eq!(tpl.text(), "% t\nThrust = 0.001; File = 'x';");
    }

    struct LineStartLocator;

    impl StatementLocator for LineStartLocator {
        fn locate(&self, content: &str, param: &str) -> Result<Range<usize>, SweepError> {
            let start = content
                .match_indices(param)
                .map(|(i, _)| i)
                .find(|&i| i == 0 || content[..i].ends_with('\n'))
                .ok_or_else(|| SweepError::MalformedTemplate {
                    param: param.to_string(),
                })?;
            let end = start
                + content[start..]
                    .find(';')
                    .ok_or_else(|| SweepError::UnterminatedStatement {
                        param: param.to_string(),
                    })?;
            Ok(start..end)
        }
    }

    #[test]
    fn custom_locator_can_replace_substring_matching() {
        let out = substitute_with(&LineStartLocator, "Thrust = 1;\n", "Thrust", "3").unwrap();
        assert_eq!(out, "Thrust = 3;\n");
    }
}
