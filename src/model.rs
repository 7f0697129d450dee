use crate::engine::aggregate::SummaryRow;
use crate::engine::sweep::SweepSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_tool_args() -> Vec<String> {
    crate::engine::tool::DEFAULT_TOOL_ARGS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}

/// Fully-resolved sweep configuration. The engine reads nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub template_path: PathBuf,
    /// Parameter whose value is swept.
    pub swept_param: String,
    /// Parameter that receives each run's output file path.
    pub output_param: String,
    pub sweep: SweepSpec,
    pub output_dir: PathBuf,
    pub tool_path: PathBuf,
    #[serde(default = "default_tool_args")]
    pub tool_args: Vec<String>,
    /// Rewritten before every run; the tool reads it from here.
    pub working_script: PathBuf,
    pub summary_path: PathBuf,
    #[serde(default = "default_true")]
    pub capture_header: bool,
    /// Abort on a nonzero tool exit instead of assuming success.
    #[serde(default)]
    pub check_exit_status: bool,
    #[serde(default, with = "humantime_serde")]
    pub run_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SweepEvent {
    SweepStarted {
        total: usize,
    },
    RunStarted {
        index: usize,
        value: String,
    },
    RunFinished {
        index: usize,
        exit_code: Option<i32>,
        #[serde(with = "humantime_serde")]
        elapsed: Duration,
    },
    Info(InfoEvent),
}

/// Structured info events emitted by the engine and consumed by CLI layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InfoEvent {
    Message(String),
    NonZeroExit { index: usize, code: Option<i32> },
    Cancelling,
    ScriptsMaterialized { count: usize },
}

impl InfoEvent {
    /// Render a human-readable message for CLI layers.
    pub fn to_message(&self) -> String {
        match self {
            InfoEvent::Message(msg) => msg.clone(),
            InfoEvent::NonZeroExit { index, code } => match code {
                Some(c) => format!("Run #{index}: tool exited with status {c} (continuing)"),
                None => format!("Run #{index}: tool was terminated by a signal (continuing)"),
            },
            InfoEvent::Cancelling => "Cancelling after the current run…".to_string(),
            InfoEvent::ScriptsMaterialized { count } => {
                format!("Dry run: {count} scripts rendered, tool not invoked")
            }
        }
    }
}

/// One iteration of the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub index: usize,
    pub value: f64,
    /// Value as written into the script.
    pub value_text: String,
    pub output_path: PathBuf,
    /// Rendered script text, kept only for dry runs. Not kept in reports.
    #[serde(skip)]
    pub script: Option<String>,
    /// `None` for dry runs or when the tool was killed by a signal.
    pub exit_code: Option<i32>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

/// What the engine hands back after the loop.
#[derive(Debug)]
pub struct SweepOutcome {
    pub started_utc: String,
    /// Runs that completed, in order. Always a prefix of the sweep.
    pub runs: Vec<RunRecord>,
    pub planned: usize,
    pub cancelled: bool,
    pub dry_run: bool,
    /// Error that stopped the loop early. `runs` still holds what finished.
    pub aborted: Option<anyhow::Error>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingOutput {
    pub index: usize,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    #[serde(default)]
    pub timestamp_utc: String,
    pub config: SweepConfig,
    pub planned_runs: usize,
    pub runs: Vec<RunRecord>,
    pub cancelled: bool,
    /// Why the sweep stopped early, if it did.
    #[serde(default)]
    pub aborted: Option<String>,
    pub dry_run: bool,
    pub summary_path: Option<PathBuf>,
    pub header_captured: bool,
    pub data_rows: usize,
    #[serde(default)]
    pub missing: Vec<MissingOutput>,
}

impl MissingOutput {
    pub fn from_row(row: &SummaryRow) -> Option<Self> {
        match row {
            SummaryRow::Missing {
                index,
                path,
                reason,
            } => Some(Self {
                index: *index,
                path: path.clone(),
                reason: reason.clone(),
            }),
            SummaryRow::Data { .. } => None,
        }
    }
}
