use crate::error::SweepError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of runs a single sweep may expand to.
pub const MAX_SWEEP_RUNS: usize = 1_000_000;

/// Relative slack when deciding whether `end` is reachable by whole steps.
const COUNT_EPSILON: f64 = 1e-9;

/// Significant digits kept when rendering a swept value into a script.
const RENDER_DIGITS: usize = 12;

/// Inclusive range `start..=end` walked by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepSpec {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl SweepSpec {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    fn invalid(&self, reason: impl Into<String>) -> SweepError {
        SweepError::InvalidSweep {
            start: self.start,
            end: self.end,
            step: self.step,
            reason: reason.into(),
        }
    }

    /// Number of values in the sweep, or why the range can't be walked.
    pub fn count(&self) -> Result<usize, SweepError> {
        let Self { start, end, step } = *self;
        if !(start.is_finite() && end.is_finite() && step.is_finite()) {
            return Err(self.invalid("start, end and step must be finite"));
        }
        if step == 0.0 {
            return Err(self.invalid("step must be nonzero"));
        }
        let steps = (end - start) / step;
        if steps < 0.0 {
            return Err(self.invalid("step points away from end"));
        }
        // floor with slack: an `end` a hair short of a whole step still counts,
        // but the walk never overshoots by a partial step.
        let whole = (steps + steps.max(1.0) * COUNT_EPSILON).floor();
        if whole >= MAX_SWEEP_RUNS as f64 {
            return Err(self.invalid(format!("more than {MAX_SWEEP_RUNS} values")));
        }
        Ok(whole as usize + 1)
    }

    /// Every value of the sweep, computed as `start + i * step`.
    pub fn values(&self) -> Result<SweepValues, SweepError> {
        let count = self.count()?;
        Ok(SweepValues {
            start: self.start,
            step: self.step,
            next: 0,
            count,
        })
    }
}

impl fmt::Display for SweepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.step)
    }
}

/// Shorthand for `SweepSpec::new(start, end, step).values()` collected.
pub fn generate(start: f64, end: f64, step: f64) -> Result<Vec<f64>, SweepError> {
    Ok(SweepSpec::new(start, end, step).values()?.collect())
}

/// Iterator over a validated sweep. Clone it to restart.
#[derive(Debug, Clone)]
pub struct SweepValues {
    start: f64,
    step: f64,
    next: usize,
    count: usize,
}

impl Iterator for SweepValues {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.count {
            return None;
        }
        let v = self.start + self.next as f64 * self.step;
        self.next += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.count - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for SweepValues {}

/// Render a value as its natural decimal form, dropping accumulated float noise.
pub fn format_value(v: f64) -> String {
    let rounded: f64 = format!("{:.*e}", RENDER_DIGITS - 1, v)
        .parse()
        .unwrap_or(v);
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{rounded}")
}
