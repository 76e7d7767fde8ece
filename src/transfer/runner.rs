//! External process runner
//!
//! The child's stderr is drained by a dedicated task that forwards masked
//! lines over a channel while the caller waits on the process. Both sides
//! meet again after exit: the channel is drained until the reader task
//! closes it, so no trailing line is lost.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::control::JobHandle;
use super::diagnostics::{DiagnosticLine, parse_line};
use super::tools::ToolInvocation;
use crate::error::{EnvironmentError, Result, TransferError};
use crate::utils::mask::mask_credentials;

/// Bounded buffer of the most recent diagnostic lines
#[derive(Debug, Clone)]
pub struct RecentLines {
    lines: VecDeque<String>,
    capacity: usize,
}

impl RecentLines {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Runs external tools under a job's cancellation token
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    diagnostic_lines: usize,
}

impl ProcessRunner {
    pub fn new(diagnostic_lines: usize) -> Self {
        Self { diagnostic_lines }
    }

    /// Run a tool to completion
    ///
    /// Every stderr line is masked, then handed to `on_line` together with its
    /// recognized shape (if any).
    ///
    /// # Arguments
    /// * `invocation` - Program and arguments
    /// * `handle` - The job's control handle; cancelling it kills the child
    /// * `on_line` - Called once per diagnostic line, in order
    ///
    /// # Returns
    /// * `Result<()>` - `Cancelled` if the token fired, `ToolFailed` on a non-zero exit
    pub async fn run<F>(
        &self,
        invocation: &ToolInvocation,
        handle: &JobHandle,
        mut on_line: F,
    ) -> Result<()>
    where
        F: FnMut(&str, Option<DiagnosticLine>),
    {
        handle.ensure_active()?;

        let tool = invocation.kind.binary_name();
        let masked_args: Vec<String> = invocation.args.iter().map(|a| mask_credentials(a)).collect();
        info!("Running {} {}", tool, masked_args.join(" "));

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => TransferError::from(EnvironmentError::ToolNotFound {
                    tool: tool.to_string(),
                }),
                _ => TransferError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TransferError::Generic(format!("{tool}: stderr was not captured")))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(mask_credentials(&line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!("stderr read ended: {}", e);
                        break;
                    }
                }
            }
        });

        let mut recent = RecentLines::new(self.diagnostic_lines);
        let mut handle_line = |line: String| {
            debug!("{}: {}", tool, line);
            let parsed = parse_line(&line);
            on_line(&line, parsed);
            recent.push(line);
        };

        let token = handle.token();
        let mut kill_sent = false;
        let status = loop {
            tokio::select! {
                Some(line) = rx.recv() => handle_line(line),
                status = child.wait() => break status?,
                _ = token.cancelled(), if !kill_sent => {
                    kill_sent = true;
                    info!("Cancelling {} for job {}", tool, handle.job_id());
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill {}: {}", tool, e);
                    }
                }
            }
        };

        while let Some(line) = rx.recv().await {
            handle_line(line);
        }
        if let Err(e) = reader.await {
            debug!("stderr reader task ended abnormally: {}", e);
        }

        if status.success() {
            return Ok(());
        }

        if token.is_cancelled() {
            return Err(TransferError::cancelled(handle.job_id()));
        }

        let message = if recent.is_empty() {
            format!("exited with {status}")
        } else {
            mask_credentials(&recent.joined())
        };
        Err(TransferError::ToolFailed {
            tool: tool.to_string(),
            message,
        })
    }
}
