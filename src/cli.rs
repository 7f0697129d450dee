use crate::engine::aggregate::OUTPUT_STEM;
use crate::engine::sweep::SweepSpec;
use crate::engine::tool::{ProcessLauncher, DEFAULT_TOOL_ARGS};
use crate::model::{SweepConfig, SweepEvent};
use crate::orchestrator::{process_sweep_completion, run_controller, ProcessedSweep};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Executable looked up on PATH when no tool is given.
const DEFAULT_TOOL: &str = "gmat";
const DEFAULT_WORKING_SCRIPT: &str = "temp.script";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Out,
    Err,
}

/// Line-oriented stdout/stderr that writes from a blocking thread, so a slow
/// terminal never stalls the event loop driving the tool.
struct Console {
    tx: mpsc::UnboundedSender<(Channel, String)>,
    writer: tokio::task::JoinHandle<()>,
}

impl Console {
    fn stdio() -> Self {
        Self::spawn(std::io::stdout(), std::io::stderr())
    }

    fn spawn<O, E>(out: O, err: E) -> Self
    where
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Channel, String)>();
        let writer = tokio::task::spawn_blocking(move || {
            let mut out = std::io::LineWriter::new(out);
            let mut err = std::io::LineWriter::new(err);
            while let Some((channel, line)) = rx.blocking_recv() {
                let target: &mut dyn Write = match channel {
                    Channel::Out => &mut out,
                    Channel::Err => &mut err,
                };
                // Nowhere left to report a broken pipe.
                let _ = writeln!(target, "{line}");
            }
            let _ = out.flush();
            let _ = err.flush();
        });
        Self { tx, writer }
    }

    fn out(&self, line: impl Into<String>) {
        let _ = self.tx.send((Channel::Out, line.into()));
    }

    fn err(&self, line: impl Into<String>) {
        let _ = self.tx.send((Channel::Err, line.into()));
    }

    /// Flush everything queued so far and stop the writer.
    async fn close(self) {
        drop(self.tx);
        let _ = self.writer.await;
    }
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "gmat-sweep",
    version,
    about = "Run a simulation script once per swept parameter value and collect the results"
)]
pub struct Cli {
    /// Script template containing `<name> = <value>;` statements
    pub template: Option<PathBuf>,

    /// JSON configuration file (as printed by --print-config); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Name of the parameter to sweep (e.g. "GMAT TwinIonEngineThrust")
    #[arg(long)]
    pub param: Option<String>,

    /// Name of the parameter that receives each run's output file path
    #[arg(long)]
    pub output_param: Option<String>,

    /// First swept value
    #[arg(long, allow_negative_numbers = true)]
    pub start: Option<f64>,

    /// Last swept value (inclusive)
    #[arg(long, allow_negative_numbers = true)]
    pub end: Option<f64>,

    /// Increment between values; negative to sweep downwards
    #[arg(long, allow_negative_numbers = true)]
    pub step: Option<f64>,

    /// Directory for per-run output files [default: ./escape_data]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// External simulation tool [default: gmat on PATH]
    #[arg(long)]
    pub tool: Option<PathBuf>,

    /// Replace the default tool flags (--run --exit --minimize); repeat per flag
    #[arg(long = "tool-arg", allow_hyphen_values = true)]
    pub tool_args: Vec<String>,

    /// Working script rewritten before every run [default: ./temp.script]
    #[arg(long)]
    pub working_script: Option<PathBuf>,

    /// Summary CSV path [default: <output-dir>/escape_data.csv]
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Do not use the first line of run #1 as a header row
    #[arg(long)]
    pub no_header: bool,

    /// Abort the sweep when the tool exits with a nonzero status
    #[arg(long)]
    pub check_exit: bool,

    /// Kill the tool and abort if a single run takes longer than this
    #[arg(long)]
    pub run_timeout: Option<humantime::Duration>,

    /// Render every script without invoking the tool
    #[arg(long)]
    pub dry_run: bool,

    /// Print JSON report and exit
    #[arg(long)]
    pub json: bool,

    /// Run silently: suppress all output except errors (for cron usage)
    #[arg(long)]
    pub silent: bool,

    /// Export the sweep report as JSON
    #[arg(long)]
    pub export_json: Option<PathBuf>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub print_config: bool,

    /// Diagnostics log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| anyhow::anyhow!("missing {flag} (or supply it via --config)"))
}

fn load_config(path: &Path) -> Result<SweepConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse config {}", path.display()))
}

/// Build a `SweepConfig` from CLI arguments, resolving relative paths against `cwd`.
pub fn build_config(args: &Cli, cwd: &Path) -> Result<SweepConfig> {
    let abs = |p: &Path| cwd.join(p);

    let mut cfg = match args.config.as_deref() {
        Some(path) => load_config(&abs(path))?,
        None => {
            let output_dir = abs(args.output_dir.as_deref().unwrap_or(Path::new(OUTPUT_STEM)));
            SweepConfig {
                template_path: abs(&required(args.template.clone(), "TEMPLATE")?),
                swept_param: required(args.param.clone(), "--param")?,
                output_param: required(args.output_param.clone(), "--output-param")?,
                sweep: SweepSpec::new(
                    required(args.start, "--start")?,
                    required(args.end, "--end")?,
                    required(args.step, "--step")?,
                ),
                summary_path: output_dir.join(format!("{OUTPUT_STEM}.csv")),
                output_dir,
                tool_path: PathBuf::from(DEFAULT_TOOL),
                tool_args: DEFAULT_TOOL_ARGS.iter().map(|s| s.to_string()).collect(),
                working_script: abs(Path::new(DEFAULT_WORKING_SCRIPT)),
                capture_header: true,
                check_exit_status: false,
                run_timeout: None,
            }
        }
    };

    if let Some(p) = args.template.as_deref() {
        cfg.template_path = abs(p);
    }
    if let Some(v) = &args.param {
        cfg.swept_param = v.clone();
    }
    if let Some(v) = &args.output_param {
        cfg.output_param = v.clone();
    }
    if let Some(v) = args.start {
        cfg.sweep.start = v;
    }
    if let Some(v) = args.end {
        cfg.sweep.end = v;
    }
    if let Some(v) = args.step {
        cfg.sweep.step = v;
    }
    if let Some(p) = args.output_dir.as_deref() {
        cfg.output_dir = abs(p);
    }
    if let Some(p) = args.tool.as_deref() {
        cfg.tool_path = p.to_path_buf();
    }
    if !args.tool_args.is_empty() {
        cfg.tool_args = args.tool_args.clone();
    }
    if let Some(p) = args.working_script.as_deref() {
        cfg.working_script = abs(p);
    }
    if let Some(p) = args.summary.as_deref() {
        cfg.summary_path = abs(p);
    }
    if args.no_header {
        cfg.capture_header = false;
    }
    if args.check_exit {
        cfg.check_exit_status = true;
    }
    if let Some(t) = args.run_timeout {
        cfg.run_timeout = Some(Duration::from(t));
    }

    Ok(cfg)
}

/// Progress line for an engine event, in text mode.
fn event_line(ev: &SweepEvent, total: &mut usize) -> String {
    match ev {
        SweepEvent::SweepStarted { total: n } => {
            *total = *n;
            format!("== Sweep: {n} runs ==")
        }
        SweepEvent::RunStarted { index, value } => {
            format!("Run #{index}/{}: value {value}", *total)
        }
        SweepEvent::RunFinished { index, elapsed, .. } => {
            let rounded = Duration::from_millis(elapsed.as_millis() as u64);
            format!(
                "Run #{index} finished in {}",
                humantime::format_duration(rounded)
            )
        }
        SweepEvent::Info(info) => info.to_message(),
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Validate that --silent can only be used with --json
    if args.silent && !args.json {
        return Err(anyhow::anyhow!(
            "--silent can only be used with --json. Use --silent --json together."
        ));
    }

    let cwd = std::env::current_dir().context("get current directory")?;
    let cfg = build_config(&args, &cwd)?;

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
        return Ok(());
    }

    let launcher = ProcessLauncher::new(&cfg.tool_path)
        .with_args(cfg.tool_args.clone())
        .with_timeout(cfg.run_timeout);

    let console = (!args.silent).then(Console::stdio);
    let show_progress = !args.json;

    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<SweepEvent>();
    let progress = async {
        let mut total = 0;
        // Keep draining even when nothing is shown so senders never back up.
        while let Some(ev) = evt_rx.recv().await {
            let line = event_line(&ev, &mut total);
            if let (true, Some(c)) = (show_progress, console.as_ref()) {
                c.err(line);
            }
        }
    };
    let (outcome, ()) = tokio::join!(
        run_controller(&cfg, &launcher, args.dry_run, evt_tx),
        progress
    );
    let outcome = outcome.context("sweep failed")?;

    let ProcessedSweep {
        report,
        warnings,
        export_messages,
        aborted,
    } = process_sweep_completion(&cfg, outcome, args.export_json.as_deref())?;

    if let Some(c) = console {
        for w in warnings {
            c.err(format!("Warning: {w}"));
        }
        for m in export_messages {
            c.err(m);
        }
        if args.json {
            c.out(serde_json::to_string_pretty(&report)?);
        } else {
            for line in crate::text_summary::build_text_summary(&report).lines {
                c.out(line);
            }
        }
        c.close().await;
    }

    // Completed runs are summarized above; the abort still fails the command.
    match aborted {
        Some(e) => Err(e.context("sweep aborted")),
        None => Ok(()),
    }
}
