//! Folds per-run output files into one comma-separated summary.
//!
//! Only two lines of each output file matter: the first line of run #1
//! (header) and the last line of every run (result row). Tokens are split on
//! whitespace and re-joined with commas.

use crate::error::SweepError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// File name stem shared by every run's output file.
pub const OUTPUT_STEM: &str = "escape_data";

/// Output file for run `index` (1-based) inside `dir`.
pub fn output_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{OUTPUT_STEM}{index}.txt"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SummaryRow {
    Data { index: usize, fields: Vec<String> },
    /// Output file absent or unreadable; written as an empty line.
    Missing { index: usize, path: PathBuf, reason: String },
}

impl SummaryRow {
    pub fn to_csv_line(&self) -> String {
        match self {
            SummaryRow::Data { fields, .. } => fields.join(","),
            SummaryRow::Missing { .. } => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub header: Option<Vec<String>>,
    pub rows: Vec<SummaryRow>,
}

impl Summary {
    pub fn data_rows(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| matches!(r, SummaryRow::Data { .. }))
            .count()
    }

    /// Missing outputs as errors, in run order.
    pub fn missing(&self) -> Vec<SweepError> {
        self.rows
            .iter()
            .filter_map(|r| match r {
                SummaryRow::Missing {
                    index,
                    path,
                    reason,
                } => Some(SweepError::MissingOutput {
                    index: *index,
                    path: path.clone(),
                    reason: reason.clone(),
                }),
                SummaryRow::Data { .. } => None,
            })
            .collect()
    }

    /// Header (when captured) then one line per run, each newline-terminated.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        if let Some(header) = &self.header {
            out.push_str(&header.join(","));
            out.push('\n');
        }
        for row in &self.rows {
            out.push_str(&row.to_csv_line());
            out.push('\n');
        }
        out
    }
}

fn tokens(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

/// First and last line of a file. Both are `None` for an empty file.
fn first_and_last_line(path: &Path) -> std::io::Result<(Option<String>, Option<String>)> {
    let reader = BufReader::new(File::open(path)?);
    let mut first = None;
    let mut last = None;
    for line in reader.lines() {
        let line = line?;
        if first.is_none() {
            first = Some(line.clone());
        }
        last = Some(line);
    }
    Ok((first, last))
}

/// Read runs `1..=run_count` from `dir` in index order.
pub fn aggregate(dir: &Path, run_count: usize, capture_header: bool) -> Summary {
    let mut summary = Summary::default();
    for index in 1..=run_count {
        let path = output_path(dir, index);
        match first_and_last_line(&path) {
            Ok((first, last)) => {
                if index == 1 && capture_header {
                    summary.header = first.as_deref().map(tokens);
                }
                if last.is_none() {
                    tracing::warn!(index, path = %path.display(), "output file is empty");
                }
                summary.rows.push(SummaryRow::Data {
                    index,
                    fields: last.as_deref().map(tokens).unwrap_or_default(),
                });
            }
            Err(e) => {
                tracing::warn!(index, path = %path.display(), error = %e, "run output unavailable");
                let reason = if e.kind() == std::io::ErrorKind::NotFound {
                    "not produced".to_string()
                } else {
                    e.to_string()
                };
                summary.rows.push(SummaryRow::Missing {
                    index,
                    path,
                    reason,
                });
            }
        }
    }
    summary
}

/// Persist the summary as CSV.
pub fn write_summary(path: &Path, summary: &Summary) -> Result<(), SweepError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| SweepError::io("create summary directory", parent, e))?;
    }
    std::fs::write(path, summary.to_csv()).map_err(|e| SweepError::io("write summary", path, e))
}
