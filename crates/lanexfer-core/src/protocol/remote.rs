//! Protocols with one side behind a service endpoint.

use std::path::{Path, PathBuf};

use super::{LaneHandle, LocalSource, Protocol, Source, TransferOptions};
use crate::error::Result;
use crate::saver::{ExtendedInfo, SaveInfo, Saver, SaverOptions, WriteOutcome, WriteStatus};
use crate::service::{InitSaver, SaverEndpoint, SourceEndpoint};

/// Local source, remote saver session.
pub struct PushProtocol<E: SaverEndpoint> {
    endpoint: E,
    source: LocalSource,
    session: String,
    lanes: usize,
    size: u64,
}

impl<E: SaverEndpoint> PushProtocol<E> {
    /// Opens a saver session for `remote_path` (relative to the service root).
    pub fn open(endpoint: E, source: Source, remote_path: &Path, opts: TransferOptions) -> Result<Self> {
        let requested = opts.saver.lanes.max(1);
        let source = LocalSource::new(source, requested);
        let size = source.size()?;
        let checksum = if opts.verify_checksum {
            Some(source.checksum()?)
        } else {
            opts.saver.expected_checksum.clone()
        };
        let lanes = source.lane_limit().map_or(requested, |l| l.min(requested));

        let info = endpoint.init_saver(InitSaver {
            path: remote_path.to_path_buf(),
            resume: opts.saver.resume,
            size: Some(size),
            checksum,
            overwrite: opts.saver.overwrite,
            extended_info: opts.saver.extended_info,
            lanes,
            block_size: opts.saver.block_size,
            cache_bytes: opts.saver.cache_bytes_per_lane,
            auto_expand: opts.saver.auto_expand,
        })?;
        tracing::info!(
            source = %source.describe(),
            remote = %remote_path.display(),
            session = %info.session_id,
            lanes = info.lane_count,
            "push transfer prepared"
        );
        Ok(Self {
            endpoint,
            source,
            session: info.session_id,
            lanes: info.lane_count.min(lanes),
            size,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session
    }
}

impl<E: SaverEndpoint> Protocol for PushProtocol<E> {
    fn file_size(&self) -> Option<u64> {
        Some(self.size)
    }

    fn lane_count(&self) -> usize {
        self.lanes
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

    fn open_destination(&self, _lane: usize) -> Result<LaneHandle> {
        Ok(LaneHandle::new(self.session.clone(), false))
    }

    fn write_destination(
        &self,
        lane: usize,
        handle: &LaneHandle,
        start: Option<u64>,
        data: &[u8],
    ) -> Result<WriteOutcome> {
        self.endpoint.write_data(&handle.id, lane, start, data)
    }

    fn close_destination(&self, _lane: usize, _handle: LaneHandle, _force: bool) -> Result<()> {
        Ok(())
    }

    fn finished(&self) -> Result<WriteStatus> {
        self.endpoint.finished(&self.session)
    }

    fn pause(&self) -> Result<()> {
        self.endpoint.flush(&self.session)
    }

    fn save_info(&self) -> Result<SaveInfo> {
        self.endpoint.get_save_info(&self.session)
    }

    fn extended_info(&self) -> Result<ExtendedInfo> {
        self.endpoint.get_extended_info(&self.session)
    }

    fn close(&self) -> Result<()> {
        self.source.close_all();
        self.endpoint.close(&self.session)
    }
}

/// Remote source (one handle per lane), local saver.
pub struct PullProtocol<E: SourceEndpoint> {
    endpoint: E,
    remote_path: PathBuf,
    saver: Saver,
    size: Option<u64>,
}

impl<E: SourceEndpoint> PullProtocol<E> {
    /// A source that cannot report its size gets a single-lane, auto-expanding saver.
    pub fn open(endpoint: E, remote_path: &Path, dest: &Path, opts: TransferOptions) -> Result<Self> {
        let size = endpoint.get_size(remote_path)?;
        let expected_checksum = match size {
            Some(_) if opts.verify_checksum => Some(endpoint.get_checksum(remote_path)?),
            _ => opts.saver.expected_checksum.clone(),
        };
        let saver = Saver::create(
            dest,
            SaverOptions {
                expected_size: size,
                expected_checksum,
                auto_expand: opts.saver.auto_expand || size.is_none(),
                ..opts.saver
            },
        )?;
        tracing::info!(
            remote = %remote_path.display(),
            dest = %dest.display(),
            size = ?size,
            lanes = saver.lane_count(),
            "pull transfer prepared"
        );
        Ok(Self {
            endpoint,
            remote_path: remote_path.to_path_buf(),
            saver,
            size,
        })
    }

    pub fn saver(&self) -> &Saver {
        &self.saver
    }
}

impl<E: SourceEndpoint> Protocol for PullProtocol<E> {
    fn file_size(&self) -> Option<u64> {
        self.size
    }

    fn lane_count(&self) -> usize {
        self.saver.lane_count()
    }

    fn open_source(&self, _lane: usize) -> Result<LaneHandle> {
        Ok(LaneHandle::new(self.endpoint.open_handle(&self.remote_path)?, true))
    }

    fn read_source(&self, _lane: usize, handle: &LaneHandle, start: u64, size: u64) -> Result<Vec<u8>> {
        self.endpoint.read(&handle.id, start, size)
    }

    fn close_source(&self, _lane: usize, handle: LaneHandle, force: bool) -> Result<()> {
        if handle.closable || force {
            self.endpoint.close_handle(&handle.id)?;
        }
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
        self.saver.close()
    }
}
