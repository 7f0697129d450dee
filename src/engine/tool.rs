use crate::error::SweepError;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Flags passed before the script path: run it, exit when done, stay minimized.
pub const DEFAULT_TOOL_ARGS: [&str; 3] = ["--run", "--exit", "--minimize"];

/// How a tool invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ToolExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs the external simulation tool against one script and waits for it.
pub trait Launcher: Send + Sync {
    /// Human-readable name used in errors and logs.
    fn name(&self) -> String;

    fn launch<'a>(
        &'a self,
        index: usize,
        script: &'a Path,
    ) -> BoxFuture<'a, Result<ToolExit, SweepError>>;
}

/// Spawns `<program> <args..> <script>` as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: DEFAULT_TOOL_ARGS.iter().map(|s| s.to_string()).collect(),
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, index: usize, script: &Path) -> Result<ToolExit, SweepError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(script)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SweepError::ExternalToolFailure {
                index,
                tool: self.name(),
                reason: format!("could not start: {e}"),
            })?;

        let waited = match self.timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(res) => res,
                    Err(_) => {
                        // kill_on_drop only signals; reap the child so it doesn't linger.
                        let _ = child.kill().await;
                        return Err(SweepError::RunTimeout {
                            index,
                            tool: self.name(),
                            timeout: limit,
                        });
                    }
                }
            }
            None => child.wait().await,
        };

        let status = waited.map_err(|e| SweepError::ExternalToolFailure {
            index,
            tool: self.name(),
            reason: format!("wait failed: {e}"),
        })?;
        Ok(ToolExit {
            code: status.code(),
        })
    }
}

impl Launcher for ProcessLauncher {
    fn name(&self) -> String {
        self.program.display().to_string()
    }

    fn launch<'a>(
        &'a self,
        index: usize,
        script: &'a Path,
    ) -> BoxFuture<'a, Result<ToolExit, SweepError>> {
        Box::pin(self.run(index, script))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_exit_code() {
        let ok = ProcessLauncher::new("true");
        assert_eq!(
            ok.launch(1, Path::new("unused.script")).await.unwrap(),
            ToolExit { code: Some(0) }
        );

        let failing = ProcessLauncher::new("false");
        let exit = failing.launch(2, Path::new("unused.script")).await.unwrap();
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn missing_executable_is_a_tool_failure() {
        let launcher = ProcessLauncher::new("/nonexistent/gmat-binary");
        let err = launcher.launch(4, Path::new("x.script")).await.unwrap_err();
        assert!(matches!(err, SweepError::ExternalToolFailure { index: 4, .. }));
    }

    #[tokio::test]
    async fn hung_tool_times_out() {
        let launcher = ProcessLauncher::new("sleep")
            .with_args(vec!["5".into()])
            .with_timeout(Some(Duration::from_millis(100)));
        let err = launcher.launch(3, Path::new("5")).await.unwrap_err();
        assert!(matches!(err, SweepError::RunTimeout { index: 3, .. }));
    }
}
