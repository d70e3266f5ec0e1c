//! Progress reporting for transfers (bytes done, ETA, rate).
//!
//! Lanes push snapshots through a bounded tokio channel with `try_send`, so a
//! slow consumer only drops updates and never stalls a lane.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::session::SessionStatus;
use crate::protocol::Protocol;
use crate::sync::lock;

/// Minimum gap between two non-final snapshots.
const REPORT_EVERY: Duration = Duration::from_millis(100);

/// Snapshot of transfer progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes committed to the destination so far.
    pub bytes_done: u64,
    /// Total size in bytes, `None` while unknown.
    pub total_bytes: Option<u64>,
    /// Elapsed time since this run started (seconds).
    pub elapsed_secs: f64,
    pub lanes: usize,
    pub status: SessionStatus,
}

impl ProgressStats {
    /// Rate in bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0 or size unknown).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes?.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0]; 0.0 while the size is unknown.
    pub fn fraction(&self) -> f64 {
        match self.total_bytes {
            Some(0) => 1.0,
            Some(total) => (self.bytes_done as f64 / total as f64).min(1.0),
            None => 0.0,
        }
    }
}

/// Shared by all lanes of one run.
pub(crate) struct ProgressReporter {
    tx: tokio::sync::mpsc::Sender<ProgressStats>,
    started: Instant,
    last: Mutex<Option<Instant>>,
}

impl ProgressReporter {
    pub fn new(tx: tokio::sync::mpsc::Sender<ProgressStats>) -> Self {
        Self {
            tx,
            started: Instant::now(),
            last: Mutex::new(None),
        }
    }

    /// Send a snapshot unless one went out recently; `force` bypasses the throttle.
    pub fn report(&self, protocol: &dyn Protocol, status: SessionStatus, force: bool) {
        {
            let mut last = lock(&self.last);
            if !force && last.is_some_and(|t| t.elapsed() < REPORT_EVERY) {
                return;
            }
            *last = Some(Instant::now());
        }
        let info = match protocol.save_info() {
            Ok(i) => i,
            Err(e) => {
                tracing::debug!("progress snapshot failed: {}", e);
                return;
            }
        };
        let _ = self.tx.try_send(ProgressStats {
            bytes_done: info.written_bytes,
            total_bytes: info.file_size,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            lanes: protocol.lane_count(),
            status,
        });
    }
}
