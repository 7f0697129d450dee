//! Text summary builder for CLI output.
//!
//! This module computes run-time metrics and formats human-readable lines for text mode.

use crate::metrics::RunTimeStats;
use crate::model::SweepReport;
use std::time::Duration;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from a finished sweep report.
pub(crate) fn build_text_summary(report: &SweepReport) -> TextSummary {
    let mut lines = Vec::new();
    let cfg = &report.config;

    lines.push(format!(
        "Sweep: {} over {} ({} planned)",
        cfg.swept_param, cfg.sweep, report.planned_runs
    ));
    if report.dry_run {
        lines.push(format!("Dry run: {} scripts rendered", report.runs.len()));
        if let (Some(first), Some(last)) = (report.runs.first(), report.runs.last()) {
            lines.push(format!("Values: {} … {}", first.value_text, last.value_text));
        }
        return TextSummary { lines };
    }

    let completed = report.runs.len();
    if report.aborted.is_some() {
        lines.push(format!("Runs: {completed} of {} (aborted)", report.planned_runs));
    } else if report.cancelled {
        lines.push(format!(
            "Runs: {completed} of {} (cancelled)",
            report.planned_runs
        ));
    } else {
        lines.push(format!("Runs: {completed}"));
    }
    if let Some(reason) = &report.aborted {
        lines.push(format!("Aborted: {reason}"));
    }

    let failed = report
        .runs
        .iter()
        .filter(|r| r.exit_code != Some(0))
        .count();
    if failed > 0 {
        lines.push(format!("Tool reported failure on {failed} run(s)"));
    }

    if let Some(path) = report.summary_path.as_deref() {
        lines.push(format!(
            "Summary: {} ({} data rows{})",
            path.display(),
            report.data_rows,
            if report.header_captured { " + header" } else { "" }
        ));
    }
    for m in &report.missing {
        lines.push(format!(
            "Missing output: run #{} {} ({})",
            m.index,
            m.path.display(),
            m.reason
        ));
    }

    let elapsed: Vec<Duration> = report.runs.iter().map(|r| r.elapsed).collect();
    if let Some(stats) = RunTimeStats::from_elapsed(&elapsed) {
        lines.push(format!(
            "Run time: avg {:.1} med {:.1} p25 {:.1} p75 {:.1} s",
            stats.mean.as_secs_f64(),
            stats.median.as_secs_f64(),
            stats.p25.as_secs_f64(),
            stats.p75.as_secs_f64()
        ));
    }

    TextSummary { lines }
}
