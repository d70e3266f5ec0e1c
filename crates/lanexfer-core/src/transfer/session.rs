//! Session status shared between the orchestrator and its lane workers.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use crate::error::{Result, TransferError};
use crate::sync::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Stopped,
    Running,
    Finished,
    Faulted,
}

struct Inner {
    status: SessionStatus,
    active_lanes: usize,
    fault: Option<String>,
}

pub(crate) struct Session {
    inner: Mutex<Inner>,
    changed: Condvar,
    abort: Arc<AtomicBool>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                status: SessionStatus::Stopped,
                active_lanes: 0,
                fault: None,
            }),
            changed: Condvar::new(),
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.inner).status
    }

    pub fn fault(&self) -> Option<String> {
        lock(&self.inner).fault.clone()
    }

    pub fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    /// `Stopped → Running` with `lanes` workers about to start. Returns
    /// `Ok(false)` when already running or faulted (nothing to start).
    pub fn begin(&self, lanes: usize) -> Result<bool> {
        let mut inner = lock(&self.inner);
        match inner.status {
            SessionStatus::Finished => Err(TransferError::TransferFinished),
            SessionStatus::Running | SessionStatus::Faulted => Ok(false),
            SessionStatus::Stopped => {
                self.abort.store(false, Ordering::Relaxed);
                inner.status = SessionStatus::Running;
                inner.active_lanes = lanes;
                if lanes == 0 {
                    inner.status = SessionStatus::Stopped;
                }
                self.changed.notify_all();
                Ok(true)
            }
        }
    }

    /// Raise the abort token; a running session becomes `Stopped`.
    pub fn request_stop(&self) {
        self.abort.store(true, Ordering::Relaxed);
        let mut inner = lock(&self.inner);
        if inner.status == SessionStatus::Running {
            inner.status = SessionStatus::Stopped;
            self.changed.notify_all();
        }
    }

    pub fn mark_finished(&self) {
        let mut inner = lock(&self.inner);
        if inner.status == SessionStatus::Running {
            inner.status = SessionStatus::Finished;
            self.changed.notify_all();
        }
    }

    /// Record a lane fault. Other lanes keep going; a finished session stays finished.
    pub fn mark_faulted(&self, lane: usize, err: &TransferError) {
        let mut inner = lock(&self.inner);
        if inner.status != SessionStatus::Finished {
            inner.status = SessionStatus::Faulted;
        }
        inner.fault = Some(format!("lane {}: {}", lane, err));
        self.changed.notify_all();
    }

    /// A worker exited. The last one out of a still-running session stops it.
    pub fn lane_exited(&self, lane: usize) {
        let mut inner = lock(&self.inner);
        inner.active_lanes = inner.active_lanes.saturating_sub(1);
        if inner.active_lanes == 0 && inner.status == SessionStatus::Running {
            tracing::warn!(lane, "all lanes exited while session still running, stopping");
            inner.status = SessionStatus::Stopped;
        }
        self.changed.notify_all();
    }

    pub fn wait_while_running(&self) -> SessionStatus {
        let guard = lock(&self.inner);
        let guard = self
            .changed
            .wait_while(guard, |i| i.status == SessionStatus::Running)
            .unwrap_or_else(PoisonError::into_inner);
        guard.status
    }
}
