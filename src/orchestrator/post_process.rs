//! Post-sweep processing.
//!
//! Aggregates run outputs into the summary CSV, removes the shared working
//! script, builds the report, and handles the optional JSON export. An
//! aborted sweep goes through the same steps for the runs that finished.

use crate::engine::aggregate;
use crate::model::{MissingOutput, SweepConfig, SweepOutcome, SweepReport};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Result of post-sweep processing, ready for presentation layers.
pub(crate) struct ProcessedSweep {
    pub report: SweepReport,
    /// Missing outputs and cleanup problems, one line each.
    pub warnings: Vec<String>,
    pub export_messages: Vec<String>,
    /// Error that stopped the sweep early; the caller reports it after the summary.
    pub aborted: Option<anyhow::Error>,
}

/// Aggregate, persist, clean up, and export.
pub(crate) fn process_sweep_completion(
    cfg: &SweepConfig,
    outcome: SweepOutcome,
    export_json: Option<&Path>,
) -> Result<ProcessedSweep> {
    let mut warnings = Vec::new();
    let mut report = SweepReport {
        timestamp_utc: outcome.started_utc,
        config: cfg.clone(),
        planned_runs: outcome.planned,
        runs: Vec::new(),
        cancelled: outcome.cancelled,
        aborted: outcome.aborted.as_ref().map(|e| format!("{e:#}")),
        dry_run: outcome.dry_run,
        summary_path: None,
        header_captured: false,
        data_rows: 0,
        missing: Vec::new(),
    };

    if !outcome.dry_run {
        // Only runs that were actually launched have an output file to look for.
        let summary =
            aggregate::aggregate(&cfg.output_dir, outcome.runs.len(), cfg.capture_header);
        aggregate::write_summary(&cfg.summary_path, &summary)?;
        tracing::info!(
            path = %cfg.summary_path.display(),
            rows = summary.data_rows(),
            "summary written"
        );

        warnings.extend(summary.missing().iter().map(|e| e.to_string()));
        report.missing = summary
            .rows
            .iter()
            .filter_map(MissingOutput::from_row)
            .collect();
        report.header_captured = summary.header.is_some();
        report.data_rows = summary.data_rows();
        report.summary_path = Some(cfg.summary_path.clone());

        if let Err(e) = remove_working_script(&cfg.working_script) {
            warnings.push(format!("{e:#}"));
        }
    }
    report.runs = outcome.runs;

    let mut export_messages = Vec::new();
    if let Some(path) = export_json {
        export_report_json(path, &report)?;
        export_messages.push(format!("Exported JSON: {}", path.display()));
    }

    Ok(ProcessedSweep {
        report,
        warnings,
        export_messages,
        aborted: outcome.aborted,
    })
}

pub(super) fn remove_working_script(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove working script {}", path.display())),
    }
}

/// Write the report as pretty JSON.
pub(crate) fn export_report_json(path: &Path, report: &SweepReport) -> Result<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create export directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("serialize sweep report")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{config, FakeTool};
    use crate::error::SweepError;
    use crate::orchestrator::run_controller_until;
    use tempfile::TempDir;

    async fn sweep(cfg: &SweepConfig, tool: &FakeTool, dry_run: bool) -> SweepOutcome {
        let (evt_tx, _evt_rx) = tokio::sync::mpsc::unbounded_channel();
        run_controller_until(cfg, tool, dry_run, evt_tx, futures::stream::pending())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn end_to_end_two_runs() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, 0.001, 0.002, 0.001);
        cfg.swept_param = "Thrust".into();
        cfg.output_param = "OutFile".into();
        std::fs::write(&cfg.template_path, "% sweep\nThrust = 0.001; OutFile = 'x';").unwrap();

        let outcome = sweep(&cfg, &FakeTool::new(), false).await;
        let processed = process_sweep_completion(&cfg, outcome, None).unwrap();

        let csv = std::fs::read_to_string(&cfg.summary_path).unwrap();
        assert_eq!(csv, "Run,Thrust,Mass\n1,0.001,11.5\n2,0.002,11.5\n");
        assert_eq!(processed.report.data_rows, 2);
        assert!(processed.report.header_captured);
        assert!(processed.warnings.is_empty());
        assert!(!cfg.working_script.exists());
    }

    #[tokio::test]
    async fn missing_output_is_recorded_not_dropped() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 1.0, 3.0, 1.0);
        std::fs::write(&cfg.template_path, crate::engine::tests::TEMPLATE).unwrap();
        let mut tool = FakeTool::new();
        tool.skip_index = Some(2);

        let outcome = sweep(&cfg, &tool, false).await;
        let processed = process_sweep_completion(&cfg, outcome, None).unwrap();

        let csv = std::fs::read_to_string(&cfg.summary_path).unwrap();
        assert_eq!(csv.lines().count(), 4);
        assert_eq!(csv.lines().nth(2), Some(""));
        assert_eq!(processed.report.data_rows, 2);
        assert_eq!(processed.report.missing.len(), 1);
        assert_eq!(processed.report.missing[0].index, 2);
        assert_eq!(processed.warnings.len(), 1);
        assert!(processed.warnings[0].contains("run #2"));
    }

    #[tokio::test]
    async fn aborted_sweep_still_summarizes_and_cleans_up() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, 1.0, 3.0, 1.0);
        cfg.check_exit_status = true;
        std::fs::write(&cfg.template_path, crate::engine::tests::TEMPLATE).unwrap();
        let mut tool = FakeTool::new();
        tool.fail_index = Some(2);

        let outcome = sweep(&cfg, &tool, false).await;
        let processed = process_sweep_completion(&cfg, outcome, None).unwrap();

        assert!(!cfg.working_script.exists());
        let csv = std::fs::read_to_string(&cfg.summary_path).unwrap();
        assert_eq!(csv, "Run,Thrust,Mass\n1,1,11.5\n");
        assert_eq!(processed.report.runs.len(), 1);
        assert_eq!(processed.report.data_rows, 1);
        assert!(processed.warnings.is_empty());

        let reason = processed.report.aborted.as_deref().unwrap();
        assert!(reason.contains("run #2"), "{reason}");
        assert!(matches!(
            processed.aborted.as_ref().and_then(|e| e.downcast_ref::<SweepError>()),
            Some(SweepError::ExternalToolFailure { index: 2, .. })
        ));
    }

    #[tokio::test]
    async fn dry_run_skips_aggregation_and_exports_report() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, 1.0, 3.0, 1.0);
        std::fs::write(&cfg.template_path, crate::engine::tests::TEMPLATE).unwrap();
        let export = dir.path().join("reports").join("sweep.json");

        let outcome = sweep(&cfg, &FakeTool::new(), true).await;
        let processed = process_sweep_completion(&cfg, outcome, Some(&export)).unwrap();

        assert!(!cfg.summary_path.exists());
        assert_eq!(processed.report.summary_path, None);
        assert_eq!(processed.export_messages.len(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export).unwrap()).unwrap();
        assert_eq!(json["dry_run"], true);
        assert_eq!(json["runs"].as_array().unwrap().len(), 3);
        assert_eq!(json["runs"][2]["value_text"], "3");
    }
}
