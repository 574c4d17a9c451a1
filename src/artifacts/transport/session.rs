//! Phase tracking for one synchronization
//!
//! ```text
//! Negotiating → Transferring → Integrating → Done
//!        └────────────┴──────────────┴──────→ Failed
//! ```
//!
//! References are only written in `Integrating`, which is entered once every
//! object of the transfer is stored.

use crate::artifacts::transport::Credential;
use crate::errors::{Result, VcsError};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Negotiating,
    Transferring,
    Integrating,
    Done,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Done | SyncPhase::Failed)
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Negotiating => "negotiating",
            SyncPhase::Transferring => "transferring",
            SyncPhase::Integrating => "integrating",
            SyncPhase::Done => "done",
            SyncPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What a progress hook is told
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncProgress {
    pub operation: &'static str,
    pub phase: SyncPhase,
    /// Objects handled so far in `Transferring`
    pub objects_done: usize,
    pub objects_total: usize,
}

pub type ProgressFn = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// Per-call knobs of fetch, push, pull and merge
#[derive(Clone, Default)]
pub struct SyncOptions {
    pub credential: Option<Credential>,
    pub progress: Option<ProgressFn>,
    /// Overrides `sync.timeout_secs`
    pub timeout: Option<Duration>,
}

impl SyncOptions {
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_progress(mut self, progress: impl Fn(&SyncProgress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("credential", &self.credential)
            .field("progress", &self.progress.as_ref().map(|_| "<hook>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct SyncSession {
    operation: &'static str,
    phase: SyncPhase,
    progress: Option<ProgressFn>,
    timeout: Duration,
    objects_done: usize,
    objects_total: usize,
}

impl SyncSession {
    pub fn new(operation: &'static str, options: &SyncOptions, default_timeout: Duration) -> Self {
        let session = SyncSession {
            operation,
            phase: SyncPhase::Negotiating,
            progress: options.progress.clone(),
            timeout: options.timeout.unwrap_or(default_timeout),
            objects_done: 0,
            objects_total: 0,
        };
        tracing::info!(operation, phase = %session.phase, "sync started");
        session.notify();

        session
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn enter(&mut self, phase: SyncPhase) {
        if self.phase.is_terminal() {
            return;
        }

        self.phase = phase;
        tracing::info!(operation = self.operation, phase = %phase, "sync phase");
        self.notify();
    }

    /// Transfer counters, forwarded to the progress hook.
    pub fn report(&mut self, objects_done: usize, objects_total: usize) {
        self.objects_done = objects_done;
        self.objects_total = objects_total;
        self.notify();
    }

    /// Await one network step under the session timeout; any error fails
    /// the session.
    pub async fn run<T, F>(&mut self, step: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, step).await {
            Ok(result) => result,
            Err(_) => Err(VcsError::Network(format!(
                "{} timed out after {}s while {}",
                self.operation,
                self.timeout.as_secs_f64(),
                self.phase
            ))),
        };

        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    pub fn fail(&mut self, error: &VcsError) {
        if self.phase.is_terminal() {
            return;
        }

        tracing::warn!(operation = self.operation, phase = %self.phase, error = %error, "sync failed");
        self.phase = SyncPhase::Failed;
        self.notify();
    }

    pub fn finish(&mut self) {
        self.enter(SyncPhase::Done);
    }

    fn notify(&self) {
        if let Some(progress) = &self.progress {
            progress(&SyncProgress {
                operation: self.operation,
                phase: self.phase,
                objects_done: self.objects_done,
                objects_total: self.objects_total,
            });
        }
    }
}
