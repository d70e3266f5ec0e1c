//! Protocol wrapper that slows reads down and records every submission.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanexfer_core::protocol::{LaneHandle, Protocol};
use lanexfer_core::saver::{ExtendedInfo, SaveInfo, WriteOutcome, WriteStatus};
use lanexfer_core::Result;

/// One `write_destination` call that carried data.
#[derive(Debug, Clone, Copy)]
pub struct Submission {
    pub lane: usize,
    pub start: u64,
    pub len: u64,
    pub status: WriteStatus,
}

pub struct Instrumented {
    inner: Arc<dyn Protocol>,
    read_delay: Option<Duration>,
    log: Mutex<Vec<Submission>>,
}

impl Instrumented {
    pub fn new(inner: Arc<dyn Protocol>) -> Self {
        Self {
            inner,
            read_delay: None,
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.log.lock().unwrap().clone()
    }
}

impl Protocol for Instrumented {
    fn file_size(&self) -> Option<u64> {
        self.inner.file_size()
    }

    fn lane_count(&self) -> usize {
        self.inner.lane_count()
    }

    fn open_source(&self, lane: usize) -> Result<LaneHandle> {
        self.inner.open_source(lane)
    }

    fn read_source(&self, lane: usize, handle: &LaneHandle, start: u64, size: u64) -> Result<Vec<u8>> {
        if let Some(d) = self.read_delay {
            std::thread::sleep(d);
        }
        self.inner.read_source(lane, handle, start, size)
    }

    fn close_source(&self, lane: usize, handle: LaneHandle, force: bool) -> Result<()> {
        self.inner.close_source(lane, handle, force)
    }

    fn open_destination(&self, lane: usize) -> Result<LaneHandle> {
        self.inner.open_destination(lane)
    }

    fn write_destination(
        &self,
        lane: usize,
        handle: &LaneHandle,
        start: Option<u64>,
        data: &[u8],
    ) -> Result<WriteOutcome> {
        let out = self.inner.write_destination(lane, handle, start, data)?;
        if let Some(start) = start {
            if !data.is_empty() {
                self.log.lock().unwrap().push(Submission {
                    lane,
                    start,
                    len: data.len() as u64,
                    status: out.status,
                });
            }
        }
        Ok(out)
    }

    fn close_destination(&self, lane: usize, handle: LaneHandle, force: bool) -> Result<()> {
        self.inner.close_destination(lane, handle, force)
    }

    fn finished(&self) -> Result<WriteStatus> {
        self.inner.finished()
    }

    fn pause(&self) -> Result<()> {
        self.inner.pause()
    }

    fn save_info(&self) -> Result<SaveInfo> {
        self.inner.save_info()
    }

    fn extended_info(&self) -> Result<ExtendedInfo> {
        self.inner.extended_info()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
