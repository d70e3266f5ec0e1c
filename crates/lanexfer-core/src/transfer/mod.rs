//! Transfer orchestrator: one worker thread per lane over a [`Protocol`].
//!
//! There is no scheduler thread. Lanes coordinate only through the
//! destination's `write_data` answers, and stop cooperatively when the
//! session's abort token is raised (checked at the top of every iteration).
//!
//! States: `Stopped → Running → {Finished | Faulted}`, and `Running → Stopped`
//! on `stop`. A stopped transfer can be started again until it finishes.

mod progress;
mod session;
mod worker;

pub use progress::ProgressStats;
pub use session::SessionStatus;

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{Result, TransferError};
use crate::protocol::Protocol;
use crate::saver::{ExtendedInfo, SaveInfo};
use crate::sync::lock;
use progress::ProgressReporter;
use session::Session;
use worker::LaneWorker;

type LaneJoin = (usize, JoinHandle<Result<()>>);

/// Drives a [`Protocol`] to completion with one thread per lane.
pub struct Transfer {
    protocol: Arc<dyn Protocol>,
    session: Arc<Session>,
    workers: Mutex<Vec<LaneJoin>>,
    /// Lane errors collected by joins and not yet handed out.
    errors: Mutex<Vec<TransferError>>,
    progress: Option<tokio::sync::mpsc::Sender<ProgressStats>>,
    lane_interval: Option<Duration>,
}

impl Transfer {
    pub fn new(protocol: Arc<dyn Protocol>) -> Self {
        Self {
            protocol,
            session: Arc::new(Session::new()),
            workers: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            progress: None,
            lane_interval: None,
        }
    }

    /// Send progress snapshots to `tx` (dropped, never awaited, when the channel is full).
    pub fn with_progress(mut self, tx: tokio::sync::mpsc::Sender<ProgressStats>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Pause each lane this long between iterations.
    pub fn with_lane_interval(mut self, interval: Duration) -> Self {
        self.lane_interval = Some(interval);
        self
    }

    pub fn protocol(&self) -> &Arc<dyn Protocol> {
        &self.protocol
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Last lane fault, if the session faulted.
    pub fn fault(&self) -> Option<String> {
        self.session.fault()
    }

    pub fn save_info(&self) -> Result<SaveInfo> {
        self.protocol.save_info()
    }

    pub fn extended_info(&self) -> Result<ExtendedInfo> {
        self.protocol.extended_info()
    }

    /// Spawn one worker per lane. With `wait`, block until the session leaves `Running`.
    ///
    /// Starting a finished transfer is `TransferFinished`; starting a running
    /// (or faulted) one changes nothing and returns its status.
    pub fn start(&self, wait: bool) -> Result<SessionStatus> {
        match self.session.status() {
            SessionStatus::Finished => return Err(TransferError::TransferFinished),
            SessionStatus::Running | SessionStatus::Faulted => return Ok(self.session.status()),
            SessionStatus::Stopped => {}
        }
        // workers of a previous run must be gone before the abort token is cleared
        self.join_workers();

        let snapshot = self.protocol.save_info()?;
        let lanes = self.protocol.lane_count();
        if !self.session.begin(lanes)? {
            return Ok(self.session.status());
        }
        tracing::info!(
            lanes,
            written = snapshot.written_bytes,
            size = ?snapshot.file_size,
            "transfer started"
        );

        let reporter = self
            .progress
            .clone()
            .map(|tx| Arc::new(ProgressReporter::new(tx)));
        let mut workers = lock(&self.workers);
        for lane in 0..lanes {
            let worker = LaneWorker {
                lane,
                protocol: Arc::clone(&self.protocol),
                session: Arc::clone(&self.session),
                progress: reporter.clone(),
                interval: self.lane_interval,
            };
            let spawned = std::thread::Builder::new()
                .name(format!("lane-{}", lane))
                .spawn(move || worker.run());
            match spawned {
                Ok(h) => workers.push((lane, h)),
                Err(e) => {
                    let err = TransferError::Io(e);
                    self.session.mark_faulted(lane, &err);
                    // lanes that never started still count as exited
                    self.session.lane_exited(lane);
                    lock(&self.errors).push(err);
                }
            }
        }
        drop(workers);

        if wait {
            return Ok(self.session.wait_while_running());
        }
        Ok(self.session.status())
    }

    /// Block until the session leaves `Running` (finished, faulted, or stopped).
    pub fn wait(&self) -> SessionStatus {
        self.session.wait_while_running()
    }

    /// Ask every lane to stop after its current iteration, optionally wait
    /// for them, then persist progress.
    pub fn stop(&self, wait: bool) -> Result<()> {
        self.session.request_stop();
        if wait {
            self.join_workers();
        }
        self.protocol.pause()?;
        tracing::info!(status = ?self.session.status(), "transfer stopped");
        Ok(())
    }

    /// Wait for all lanes; returns the session status, or the first lane error.
    pub fn join(&self) -> Result<SessionStatus> {
        self.join_workers();
        let mut errors = lock(&self.errors);
        if errors.is_empty() {
            return Ok(self.session.status());
        }
        Err(errors.remove(0))
    }

    /// Stop, wait for lanes, and close the protocol.
    pub fn close(&self) -> Result<()> {
        self.stop(true)?;
        self.protocol.close()
    }

    fn join_workers(&self) {
        let handles = std::mem::take(&mut *lock(&self.workers));
        for (lane, h) in handles {
            let outcome = h.join().unwrap_or_else(|_| {
                let err = TransferError::LanePanicked(lane);
                self.session.mark_faulted(lane, &err);
                Err(err)
            });
            if let Err(e) = outcome {
                lock(&self.errors).push(e);
            }
        }
    }
}

impl Drop for Transfer {
    fn drop(&mut self) {
        self.session.request_stop();
        self.join_workers();
    }
}
