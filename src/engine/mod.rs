pub mod aggregate;
pub mod substitute;
pub mod sweep;
pub mod tool;

use crate::error::SweepError;
use crate::model::{InfoEvent, RunRecord, SweepConfig, SweepEvent, SweepOutcome};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Instant;
use substitute::{StatementLocator, SubstringLocator, Template};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tool::Launcher;

#[derive(Debug, Clone)]
pub enum EngineControl {
    /// Stop before the next run starts.
    Cancel,
}

pub struct SweepEngine {
    cfg: SweepConfig,
    template: Template,
    locator: Box<dyn StatementLocator>,
    dry_run: bool,
}

impl SweepEngine {
    pub fn new(cfg: SweepConfig, template: Template) -> Self {
        Self {
            cfg,
            template,
            locator: Box::new(SubstringLocator),
            dry_run: false,
        }
    }

    pub fn with_locator(mut self, locator: Box<dyn StatementLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Render every script but never launch the tool.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Script text for run `index` with the swept value already rendered.
    fn render_run(&self, index: usize, value_text: &str) -> Result<(String, PathBuf)> {
        let output_path = aggregate::output_path(&self.cfg.output_dir, index);
        let quoted = format!("'{}'", output_path.display());
        let script = self
            .template
            .render(
                self.locator.as_ref(),
                &[
                    (self.cfg.swept_param.as_str(), value_text),
                    (self.cfg.output_param.as_str(), quoted.as_str()),
                ],
            )
            .with_context(|| format!("run #{index}: render {}", self.template.path.display()))?;
        Ok((script, output_path))
    }

    /// Errors before the first run is written come back as `Err`. Anything
    /// that stops the loop after that lands in [`SweepOutcome::aborted`] so
    /// the runs already finished can still be aggregated.
    pub async fn run(
        self,
        launcher: &dyn Launcher,
        event_tx: mpsc::UnboundedSender<SweepEvent>,
        mut control_rx: mpsc::UnboundedReceiver<EngineControl>,
    ) -> Result<SweepOutcome> {
        let values = self.cfg.sweep.values()?;
        let planned = values.len();

        // Render run #1 up front so a bad template fails before anything is written.
        if let Some(first) = values.clone().next() {
            self.render_run(1, &sweep::format_value(first))?;
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let cancel2 = cancel.clone();
        let event_tx2 = event_tx.clone();
        let control_handle = tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                match msg {
                    EngineControl::Cancel => {
                        cancel2.store(true, Ordering::Relaxed);
                        let _ = event_tx2.send(SweepEvent::Info(InfoEvent::Cancelling));
                        break;
                    }
                }
            }
        });

        let result = self
            .run_loop(values, planned, launcher, &event_tx, &cancel)
            .await;

        // Dropping a JoinHandle does not stop the task.
        control_handle.abort();
        result
    }

    async fn run_loop(
        &self,
        values: sweep::SweepValues,
        planned: usize,
        launcher: &dyn Launcher,
        event_tx: &mpsc::UnboundedSender<SweepEvent>,
        cancel: &AtomicBool,
    ) -> Result<SweepOutcome> {
        if !self.dry_run {
            tokio::fs::create_dir_all(&self.cfg.output_dir)
                .await
                .map_err(|e| SweepError::io("create output directory", &self.cfg.output_dir, e))?;
        }

        let _ = event_tx.send(SweepEvent::SweepStarted { total: planned });
        tracing::info!(
            planned,
            param = %self.cfg.swept_param,
            sweep = %self.cfg.sweep,
            "starting sweep"
        );

        let started_utc = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "now".into());
        let mut runs = Vec::with_capacity(planned);
        let mut cancelled = false;
        let mut aborted = None;
        for (i, value) in values.enumerate() {
            let index = i + 1;
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                tracing::info!(completed = runs.len(), "sweep cancelled");
                break;
            }
            match self.run_one(index, value, launcher, event_tx).await {
                Ok(record) => runs.push(record),
                Err(e) => {
                    tracing::error!(
                        index,
                        completed = runs.len(),
                        error = %format!("{e:#}"),
                        "sweep aborted"
                    );
                    aborted = Some(e);
                    break;
                }
            }
        }

        if self.dry_run {
            let _ = event_tx.send(SweepEvent::Info(InfoEvent::ScriptsMaterialized {
                count: runs.len(),
            }));
        }

        Ok(SweepOutcome {
            started_utc,
            runs,
            planned,
            cancelled,
            dry_run: self.dry_run,
            aborted,
        })
    }

    async fn run_one(
        &self,
        index: usize,
        value: f64,
        launcher: &dyn Launcher,
        event_tx: &mpsc::UnboundedSender<SweepEvent>,
    ) -> Result<RunRecord> {
        let value_text = sweep::format_value(value);
        let (script, output_path) = self.render_run(index, &value_text)?;

        let mut record = RunRecord {
            index,
            value,
            value_text: value_text.clone(),
            output_path,
            script: None,
            exit_code: None,
            elapsed: Default::default(),
        };

        if self.dry_run {
            record.script = Some(script);
            return Ok(record);
        }

        write_script(&self.cfg.working_script, &script)
            .await
            .with_context(|| format!("run #{index}"))?;

        let _ = event_tx.send(SweepEvent::RunStarted {
            index,
            value: value_text,
        });
        tracing::debug!(index, script = %self.cfg.working_script.display(), "launching tool");

        let started = Instant::now();
        let exit = launcher.launch(index, &self.cfg.working_script).await?;
        record.elapsed = started.elapsed();
        record.exit_code = exit.code;

        if !exit.success() {
            if self.cfg.check_exit_status {
                return Err(SweepError::ExternalToolFailure {
                    index,
                    tool: launcher.name(),
                    reason: match exit.code {
                        Some(c) => format!("exited with status {c}"),
                        None => "terminated by a signal".to_string(),
                    },
                }
                .into());
            }
            tracing::warn!(index, code = ?exit.code, "tool reported failure; assuming success");
            let _ = event_tx.send(SweepEvent::Info(InfoEvent::NonZeroExit {
                index,
                code: exit.code,
            }));
        }

        let _ = event_tx.send(SweepEvent::RunFinished {
            index,
            exit_code: exit.code,
            elapsed: record.elapsed,
        });
        Ok(record)
    }
}

/// Write the working script and close it before the tool gets to read it.
async fn write_script(path: &Path, script: &str) -> Result<(), SweepError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| SweepError::io("create working script", path, e))?;
    file.write_all(script.as_bytes())
        .await
        .map_err(|e| SweepError::io("write working script", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| SweepError::io("flush working script", path, e))?;
    Ok(())
}
