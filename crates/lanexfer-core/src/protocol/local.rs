//! Local file to local file.

use std::path::Path;

use super::{LaneHandle, LocalSource, Protocol, Source, TransferOptions};
use crate::error::Result;
use crate::saver::{ExtendedInfo, SaveInfo, Saver, SaverOptions, WriteOutcome, WriteStatus};

/// Reads a local source and writes through a [`Saver`] it owns.
pub struct LocalProtocol {
    source: LocalSource,
    saver: Saver,
    size: u64,
}

impl LocalProtocol {
    /// Size (and checksum, when verifying) are taken from the source; an
    /// open-stream source runs on one lane.
    pub fn open(source: Source, dest: &Path, opts: TransferOptions) -> Result<Self> {
        let requested = opts.saver.lanes.max(1);
        let source = LocalSource::new(source, requested);
        let size = source.size()?;
        let expected_checksum = if opts.verify_checksum {
            Some(source.checksum()?)
        } else {
            opts.saver.expected_checksum.clone()
        };
        let lanes = source.lane_limit().map_or(requested, |l| l.min(requested));

        let saver = Saver::create(
            dest,
            SaverOptions {
                expected_size: Some(size),
                expected_checksum,
                lanes,
                ..opts.saver
            },
        )?;
        tracing::info!(
            source = %source.describe(),
            dest = %dest.display(),
            size,
            lanes = saver.lane_count(),
            "local transfer prepared"
        );
        Ok(Self { source, saver, size })
    }

    pub fn saver(&self) -> &Saver {
        &self.saver
    }
}

impl Protocol for LocalProtocol {
    fn file_size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn lane_count(&self) -> usize {
        self.saver.lane_count()
    }

    fn open_source(&self, lane: usize) -> Result<LaneHandle> {
        self.source.open(lane)
    }

    fn read_source(&self, lane: usize, _handle: &LaneHandle, start: u64, size: u64) -> Result<Vec<u8>> {
        self.source.read(lane, start, size)
    }

    fn close_source(&self, lane: usize, handle: LaneHandle, force: bool) -> Result<()> {
        self.source.close(lane, &handle, force);
        Ok(())
    }

    fn open_destination(&self, lane: usize) -> Result<LaneHandle> {
        Ok(LaneHandle::new(lane.to_string(), false))
    }

    fn write_destination(
        &self,
        lane: usize,
        _handle: &LaneHandle,
        start: Option<u64>,
        data: &[u8],
    ) -> Result<WriteOutcome> {
        self.saver.write_data(lane, start, data)
    }

    fn close_destination(&self, _lane: usize, _handle: LaneHandle, _force: bool) -> Result<()> {
        Ok(())
    }

    fn finished(&self) -> Result<WriteStatus> {
        self.saver.finished()
    }

    fn pause(&self) -> Result<()> {
        self.saver.flush()
    }

    fn save_info(&self) -> Result<SaveInfo> {
        Ok(self.saver.get_save_info())
    }

    fn extended_info(&self) -> Result<ExtendedInfo> {
        Ok(self.saver.get_extended_info())
    }

    fn close(&self) -> Result<()> {
        self.source.close_all();
        self.saver.close()
    }
}
