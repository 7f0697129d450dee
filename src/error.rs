//! Error taxonomy for the sweep engine.
//!
//! Substitution and sweep errors abort a sweep before the external tool is
//! launched. Aggregation problems are recorded per row instead (see
//! [`crate::engine::aggregate`]).

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("malformed template: parameter `{param}` not found")]
    MalformedTemplate { param: String },

    #[error("unterminated statement: no `;` after parameter `{param}`")]
    UnterminatedStatement { param: String },

    #[error("invalid sweep (start={start}, end={end}, step={step}): {reason}")]
    InvalidSweep {
        start: f64,
        end: f64,
        step: f64,
        reason: String,
    },

    #[error("run #{index}: external tool `{tool}` failed: {reason}")]
    ExternalToolFailure {
        index: usize,
        tool: String,
        reason: String,
    },

    #[error("run #{index}: external tool `{tool}` did not finish within {timeout:?}")]
    RunTimeout {
        index: usize,
        tool: String,
        timeout: Duration,
    },

    #[error("run #{index}: output file {} unavailable: {reason}", .path.display())]
    MissingOutput {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SweepError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SweepError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
