//! Sweep lifecycle controller.
//!
//! Loads the template, drives the engine, and turns Ctrl-C into a cooperative
//! cancel so the run in flight finishes and its output is still aggregated.
//! A second Ctrl-C drops the run in flight, which kills the tool.

use super::post_process::remove_working_script;
use crate::engine::substitute::Template;
use crate::engine::tool::Launcher;
use crate::engine::{EngineControl, SweepEngine};
use crate::model::{InfoEvent, SweepConfig, SweepEvent, SweepOutcome};
use anyhow::Result;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Duration;

/// How long a pending cancel waits before telling the user the tool is still busy.
const CANCEL_NOTICE_AFTER: Duration = Duration::from_secs(3);

/// Run the sweep to completion (or cancellation) and return what the engine produced.
pub(crate) async fn run_controller(
    cfg: &SweepConfig,
    launcher: &dyn Launcher,
    dry_run: bool,
    event_tx: UnboundedSender<SweepEvent>,
) -> Result<SweepOutcome> {
    let ctrl_c = futures::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
    });
    run_controller_until(cfg, launcher, dry_run, event_tx, ctrl_c).await
}

/// Like [`run_controller`], with the interrupt source supplied by the caller.
/// Each item of `interrupts` is one Ctrl-C.
pub(crate) async fn run_controller_until<S>(
    cfg: &SweepConfig,
    launcher: &dyn Launcher,
    dry_run: bool,
    event_tx: UnboundedSender<SweepEvent>,
    interrupts: S,
) -> Result<SweepOutcome>
where
    S: Stream<Item = ()>,
{
    let template = Template::load(&cfg.template_path).await?;
    let (ctrl_tx, ctrl_rx) = tokio::sync::mpsc::unbounded_channel::<EngineControl>();
    let engine = SweepEngine::new(cfg.clone(), template).dry_run(dry_run);

    // Boxed so it can be dropped early on a forced stop.
    let mut run = Box::pin(engine.run(launcher, event_tx.clone(), ctrl_rx));
    tokio::pin!(interrupts);

    let mut interrupted = false;
    let mut interrupts_open = true;
    let mut forced = false;
    let mut cancel_deadline: Option<tokio::time::Instant> = None;
    let mut watchdog = tokio::time::interval(Duration::from_millis(500));

    let res = loop {
        tokio::select! {
            res = &mut run => break res,
            next = interrupts.next(), if interrupts_open => match next {
                None => interrupts_open = false,
                Some(()) if !interrupted => {
                    interrupted = true;
                    tracing::info!("interrupt received, cancelling sweep");
                    let _ = ctrl_tx.send(EngineControl::Cancel);
                    cancel_deadline = Some(tokio::time::Instant::now() + CANCEL_NOTICE_AFTER);
                }
                Some(()) => {
                    tracing::warn!("second interrupt, stopping the run in flight");
                    let _ = event_tx.send(SweepEvent::Info(InfoEvent::Message(
                        "Second interrupt: stopping now".into(),
                    )));
                    forced = true;
                    break Err(anyhow::anyhow!(
                        "sweep stopped by a second interrupt; the run in flight was killed"
                    ));
                }
            },
            // The tool can run for minutes; keep the user informed while we wait it out.
            _ = watchdog.tick() => {
                if let Some(deadline) = cancel_deadline {
                    if tokio::time::Instant::now() >= deadline {
                        let _ = event_tx.send(SweepEvent::Info(InfoEvent::Message(
                            "Still waiting for the current run to finish… (Ctrl-C again to stop now)"
                                .into(),
                        )));
                        cancel_deadline = None;
                    }
                }
            }
        }
    };

    if forced {
        // Dropping the engine future drops the child, which is killed on drop.
        drop(run);
        if let Err(e) = remove_working_script(&cfg.working_script) {
            tracing::warn!(error = %format!("{e:#}"), "working script left behind");
        }
    }
    res
}
