//! Cancellation and pause control for running jobs
//!
//! Every in-flight job owns exactly one [`CancellationToken`], registered
//! under its job id for as long as the job's [`JobHandle`] is alive. Pausing is
//! process-wide: a single [`PauseGate`] parks every job at its next
//! checkpoint until it is resumed or the job is cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SelectionError, TransferError};

/// Process-wide pause flag
#[derive(Debug, Clone)]
pub struct PauseGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the flag. Returns `true` if it was not already set.
    pub fn pause(&self) -> bool {
        self.set(true)
    }

    /// Clear the flag. Returns `true` if it was set.
    pub fn resume(&self) -> bool {
        self.set(false)
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    fn set(&self, paused: bool) -> bool {
        self.tx.send_if_modified(|value| {
            if *value == paused {
                false
            } else {
                *value = paused;
                true
            }
        })
    }

    /// Park until the gate opens.
    ///
    /// # Returns
    /// * `bool` - `false` when `token` fired while waiting
    pub async fn wait_until_resumed(&self, token: &CancellationToken) -> bool {
        let mut rx = self.tx.subscribe();
        loop {
            if token.is_cancelled() {
                return false;
            }
            if !*rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
                _ = token.cancelled() => return false,
            }
        }
    }
}

/// Registry of cancellation tokens keyed by job id
#[derive(Debug, Default)]
pub struct TransferControl {
    tokens: Mutex<HashMap<String, CancellationToken>>,
    gate: PauseGate,
}

impl TransferControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a job and hand out its handle.
    ///
    /// The token is removed from the registry when the handle is dropped.
    ///
    /// # Returns
    /// * `Result<JobHandle>` - `JobIdInUse` while another job holds the id
    pub fn register(self: &Arc<Self>, job_id: impl Into<String>) -> Result<JobHandle> {
        let job_id = job_id.into();
        let token = CancellationToken::new();
        {
            let mut tokens = self.lock();
            if tokens.contains_key(&job_id) {
                return Err(SelectionError::JobIdInUse(job_id).into());
            }
            tokens.insert(job_id.clone(), token.clone());
        }
        debug!("Registered job {}", job_id);

        Ok(JobHandle {
            job_id,
            token,
            gate: self.gate.clone(),
            control: Arc::clone(self),
        })
    }

    /// Cancel one job, or every registered job when `job_id` is `None`.
    ///
    /// # Returns
    /// * `usize` - Number of tokens that were signalled
    pub fn cancel(&self, job_id: Option<&str>) -> usize {
        let tokens = self.lock();
        match job_id {
            Some(id) => match tokens.get(id) {
                Some(token) => {
                    token.cancel();
                    1
                }
                None => 0,
            },
            None => {
                tokens.values().for_each(CancellationToken::cancel);
                tokens.len()
            }
        }
    }

    pub fn pause(&self) -> bool {
        self.gate.pause()
    }

    pub fn resume(&self) -> bool {
        self.gate.resume()
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Ids of the jobs currently registered, sorted
    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        // A poisoned map is still a valid map.
        self.tokens.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// A running job's view of the control plane
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    token: CancellationToken,
    gate: PauseGate,
    control: Arc<TransferControl>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with [`TransferError::Cancelled`] if the token fired.
    pub fn ensure_active(&self) -> Result<()> {
        if self.token.is_cancelled() {
            Err(TransferError::cancelled(&self.job_id))
        } else {
            Ok(())
        }
    }

    /// Cooperative suspension point.
    ///
    /// Returns immediately when neither paused nor cancelled, parks while the
    /// gate is closed, and fails with [`TransferError::Cancelled`] if the token
    /// fires before or during the wait.
    pub async fn checkpoint(&self) -> Result<()> {
        self.ensure_active()?;
        if self.gate.is_paused() && !self.gate.wait_until_resumed(&self.token).await {
            return Err(TransferError::cancelled(&self.job_id));
        }
        self.ensure_active()
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.control.lock().remove(&self.job_id);
        debug!("Released job {}", self.job_id);
    }
}

/// Counts records and signals every `every`-th one.
#[derive(Debug, Clone)]
pub struct PollInterval {
    every: u64,
    seen: u64,
}

impl PollInterval {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            seen: 0,
        }
    }

    /// Count one record; `true` when a checkpoint is due.
    pub fn tick(&mut self) -> bool {
        self.seen += 1;
        self.seen % self.every == 0
    }
}
