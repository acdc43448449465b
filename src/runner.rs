// dumptool/src/runner.rs
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{AppError, Result};

const STDERR_TAIL_BYTES: usize = 4096;

/// Exit status and captured output of one external tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    /// Turns a non-zero exit into `ExternalToolFailed`, keeping the tail of stderr.
    pub fn into_success(self, tool: &str) -> Result<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(AppError::ExternalToolFailed {
            tool: tool.to_string(),
            exit_status: self.exit_status,
            stderr: stderr_tail(&self.stderr),
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim_end();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Display name of an executable for logs and errors.
pub fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

/// Runs an external executable to completion.
///
/// Implementations must kill the child when the returned future is dropped,
/// so callers can impose their own deadline or cancellation.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput>;
}

/// Runs tools with `tokio::process`, capturing stdout and stderr.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner {
    deadline: Option<Duration>,
}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills the tool and fails with `ToolTimedOut` once `deadline` elapses.
    pub fn with_deadline(deadline: Duration) -> Self {
        TokioProcessRunner {
            deadline: Some(deadline),
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let tool = tool_name(program);
        info!(tool = %tool, "Launching external tool");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, child.wait_with_output())
                .await
                .map_err(|_| AppError::ToolTimedOut {
                    tool: tool.clone(),
                    secs: deadline.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        debug!(
            tool = %tool,
            status = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "External tool exited"
        );

        Ok(ToolOutput {
            exit_status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
