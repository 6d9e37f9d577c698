//! External media tool runner
//!
//! ffprobe and ffmpeg may write more than a pipe buffer (64KB) to stderr.
//! Reading only one pipe while the child blocks on the other deadlocks both
//! sides, so both pipes are drained by dedicated threads while the parent
//! waits on the child with a deadline.
//!
//! ```ignore
//! use shared_utils::ffmpeg_process::run_with_timeout;
//! use std::process::Command;
//! use std::time::Duration;
//!
//! let mut cmd = Command::new("ffprobe");
//! cmd.args(["-v", "error", "-show_format", "input.mp4"]);
//! let output = run_with_timeout(&mut cmd, Some(Duration::from_secs(30)))?;
//! ```

use crate::logging::log_external_tool;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} did not finish within {timeout:?} and was killed")]
    Timeout { tool: String, timeout: Duration },

    #[error("Failed to wait for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished child process.
#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr lines, for human-readable diagnostics.
    pub fn stderr_tail(&self, lines: usize) -> String {
        let tail: Vec<&str> = self
            .stderr
            .lines()
            .filter(|l| !l.trim().is_empty())
            .collect();
        let start = tail.len().saturating_sub(lines);
        tail[start..].join("\n")
    }
}

/// Running child with both pipes drained in the background.
pub struct FfmpegProcess {
    tool: String,
    args: Vec<String>,
    child: Child,
    stdout_thread: Option<JoinHandle<String>>,
    stderr_thread: Option<JoinHandle<String>>,
    started: Instant,
}

impl FfmpegProcess {
    pub fn spawn(cmd: &mut Command) -> Result<Self, ProcessError> {
        let tool = cmd.get_program().to_string_lossy().to_string();
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        debug!(tool = %tool, args = ?args, "Spawning external tool");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ProcessError::ToolNotFound(tool.clone())
            } else {
                ProcessError::Spawn {
                    tool: tool.clone(),
                    source,
                }
            }
        })?;

        let stdout_thread = child.stdout.take().map(drain);
        let stderr_thread = child.stderr.take().map(drain);

        Ok(Self {
            tool,
            args,
            child,
            stdout_thread,
            stderr_thread,
            started: Instant::now(),
        })
    }

    /// Wait for the child; kill it once `timeout` has elapsed.
    pub fn wait_with_timeout(mut self, timeout: Option<Duration>) -> Result<ProcessOutput, ProcessError> {
        let status = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    return Err(ProcessError::Wait {
                        tool: self.tool.clone(),
                        source,
                    })
                }
            }

            if let Some(limit) = timeout {
                if self.started.elapsed() >= limit {
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    self.join_pipes();
                    log_external_tool(&self.tool, &self.args, "timed out", None, self.started.elapsed());
                    return Err(ProcessError::Timeout {
                        tool: self.tool.clone(),
                        timeout: limit,
                    });
                }
            }
            thread::sleep(POLL_INTERVAL);
        };

        let (stdout, stderr) = self.join_pipes();
        let duration = self.started.elapsed();
        log_external_tool(&self.tool, &self.args, &stderr, status.code(), duration);

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
            duration,
        })
    }

    fn join_pipes(&mut self) -> (String, String) {
        let stdout = self
            .stdout_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = self
            .stderr_thread
            .take()
            .map(|t| t.join().unwrap_or_default())
            .unwrap_or_default();
        (stdout, stderr)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Spawn `cmd` and wait for it, bounded by `timeout` when given.
pub fn run_with_timeout(cmd: &mut Command, timeout: Option<Duration>) -> Result<ProcessOutput, ProcessError> {
    FfmpegProcess::spawn(cmd)?.wait_with_timeout(timeout)
}

pub fn is_tool_available(tool: &str) -> bool {
    which::which(tool).is_ok()
}

pub fn require_tool(tool: &str) -> Result<(), ProcessError> {
    if is_tool_available(tool) {
        Ok(())
    } else {
        Err(ProcessError::ToolNotFound(tool.to_string()))
    }
}
