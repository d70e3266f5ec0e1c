//! One lane's fetch/submit loop.

use std::sync::Arc;
use std::time::Duration;

use super::progress::ProgressReporter;
use super::session::Session;
use crate::error::{Result, TransferError};
use crate::protocol::{LaneHandle, Protocol};
use crate::saver::{FetchRange, WriteOutcome, WriteStatus};

pub(crate) struct LaneWorker {
    pub lane: usize,
    pub protocol: Arc<dyn Protocol>,
    pub session: Arc<Session>,
    pub progress: Option<Arc<ProgressReporter>>,
    pub interval: Option<Duration>,
}

/// Tells the session the lane is gone, even if the loop panicked.
struct ExitGuard<'a> {
    lane: usize,
    session: &'a Session,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.session.lane_exited(self.lane);
    }
}

impl LaneWorker {
    pub fn run(self) -> Result<()> {
        let _exit = ExitGuard {
            lane: self.lane,
            session: &self.session,
        };
        let mut source: Option<LaneHandle> = None;
        let mut dest: Option<LaneHandle> = None;

        let result = self.drive(&mut source, &mut dest);

        if let Some(h) = source.take() {
            if let Err(e) = self.protocol.close_source(self.lane, h, false) {
                tracing::warn!(lane = self.lane, "close source failed: {}", e);
            }
        }
        if let Some(h) = dest.take() {
            if let Err(e) = self.protocol.close_destination(self.lane, h, false) {
                tracing::warn!(lane = self.lane, "close destination failed: {}", e);
            }
        }

        if let Some(p) = &self.progress {
            p.report(self.protocol.as_ref(), self.session.status(), true);
        }
        if let Err(e) = &result {
            tracing::error!(lane = self.lane, "lane failed: {}", e);
            self.session.mark_faulted(self.lane, e);
        }
        result
    }

    fn drive(&self, source: &mut Option<LaneHandle>, dest: &mut Option<LaneHandle>) -> Result<()> {
        let lane = self.lane;
        let protocol = self.protocol.as_ref();
        let mut pending: Option<FetchRange> = None;

        loop {
            if self.session.aborted() {
                tracing::debug!(lane, "lane observed stop");
                return Ok(());
            }
            if dest.is_none() {
                *dest = Some(protocol.open_destination(lane)?);
            }
            let Some(dh) = dest.as_ref() else {
                return Err(TransferError::Closed);
            };

            let outcome = match pending {
                None => protocol.write_destination(lane, dh, None, &[])?,
                Some(f) => {
                    if source.is_none() {
                        *source = Some(protocol.open_source(lane)?);
                    }
                    let Some(sh) = source.as_ref() else {
                        return Err(TransferError::Closed);
                    };
                    let data = protocol.read_source(lane, sh, f.start, f.size)?;
                    if data.is_empty() && protocol.file_size().is_none() {
                        tracing::debug!(lane, offset = f.start, "end of unknown-size source");
                        WriteOutcome::idle(lane, protocol.finished()?)
                    } else {
                        protocol.write_destination(lane, dh, Some(f.start), &data)?
                    }
                }
            };

            match outcome.status {
                WriteStatus::Ok => {}
                WriteStatus::Completed => {
                    tracing::info!(lane, "transfer complete");
                    self.session.mark_finished();
                    return Ok(());
                }
                WriteStatus::RangeMismatch => {
                    return Err(TransferError::RangeMismatch {
                        lane,
                        expected: outcome.next.map(|f| f.start),
                        got: pending.map_or(0, |f| f.start),
                    });
                }
                WriteStatus::ChecksumMismatch => {
                    let expected = protocol
                        .save_info()
                        .ok()
                        .and_then(|i| i.checksum)
                        .unwrap_or_default();
                    return Err(TransferError::ChecksumMismatch { expected });
                }
            }

            if let Some(p) = &self.progress {
                p.report(protocol, self.session.status(), false);
            }

            match outcome.next {
                Some(next) => pending = Some(next),
                None => {
                    tracing::debug!(lane, "no more work for lane");
                    return Ok(());
                }
            }
            if let Some(d) = self.interval {
                std::thread::sleep(d);
            }
        }
    }
}
