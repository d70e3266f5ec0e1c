//! Saver: crash-recoverable, exactly-once coverage of one destination file.
//!
//! Owns the pending-range ledger, the temp file, the sidecar record, the lock
//! marker, and one write buffer per lane. Lanes drive it through a single
//! coupled call, [`Saver::write_data`], which both accepts data for the lane's
//! assigned offset and answers with the lane's next range to fetch.
//!
//! Locking: each lane buffer has its own mutex; the ledger, counters and every
//! lane's assignment live under one ledger-wide mutex held only for
//! bookkeeping, never across the temp-file write itself. Lock order is
//! lane buffer → ledger → (nothing); finalize takes lifecycle → ledger.

mod lane;
mod lock;
mod options;
mod outcome;
mod record;

pub use lane::FetchRange;
pub use lock::LockFile;
pub use options::{ExtendedInfo, SaverOptions, SaverPaths, SidecarExtensions};
pub use outcome::{Completion, SaveInfo, WriteOutcome, WriteStatus};
pub use record::{read_record, Sidecar, TransferRecord};

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use crate::checksum;
use crate::error::{Result, TransferError};
use crate::ledger::Ledger;
use crate::storage::{StorageWriter, StorageWriterBuilder};
use crate::sync::{lock, read, write};
use lane::{assign_lane, Assignment, LaneCursor};
use record::remove_if_exists;

/// Bytes accepted from a lane but not yet flushed; `data[0]` belongs at `start`.
#[derive(Default)]
struct LaneBuffer {
    start: u64,
    data: Vec<u8>,
}

struct SaverState {
    record: TransferRecord,
    cursors: Vec<LaneCursor>,
    /// End of the furthest ledger interval ever claimed whole by a lane.
    high_water: u64,
    /// Ledger emptied; finalize is due.
    finished: bool,
    flushes: u64,
}

impl SaverState {
    fn assign(&mut self, lane: usize, block_size: u64, cache_bytes: u64) {
        let outcome = assign_lane(
            &mut self.cursors,
            lane,
            &self.record.store_index,
            &mut self.high_water,
            block_size,
            cache_bytes,
        );
        match outcome {
            Assignment::Claimed(r) => {
                tracing::debug!(lane, start = r.start, end = ?r.end, "lane claimed range");
            }
            Assignment::Stolen { from, range } => {
                tracing::debug!(lane, from, start = range.start, end = ?range.end, "lane split busy range");
            }
            Assignment::Kept | Assignment::Idle => {}
        }
    }
}

struct Lifecycle {
    lock: Option<LockFile>,
    completion: Completion,
}

/// Destination side of a transfer. Shared by reference between lanes.
pub struct Saver {
    paths: SaverPaths,
    sidecar: Sidecar,
    block_size: u64,
    cache_bytes: u64,
    lanes: Vec<Mutex<LaneBuffer>>,
    state: Mutex<SaverState>,
    storage: RwLock<Option<StorageWriter>>,
    lifecycle: Mutex<Lifecycle>,
    closed: AtomicBool,
}

impl Saver {
    /// Open (or resume) the transfer into `dest`.
    ///
    /// Fails with `AlreadyExists`, `AlreadyLocked`, `InconsistentResume`,
    /// `FileNotFound`, `CorruptTempFile` or `CorruptSidecar`; anything acquired
    /// before the failure (lock marker, fresh temp file) is released.
    pub fn create(dest: &Path, opts: SaverOptions) -> Result<Saver> {
        let dest = absolute(dest)?;
        let mut paths = SaverPaths::new(&dest, &opts.extensions);
        if dest.exists() && !opts.overwrite {
            return Err(TransferError::AlreadyExists(dest));
        }
        std::fs::create_dir_all(paths.dir())?;

        let lock_file = LockFile::acquire(&paths.lock)?;
        let sidecar = Sidecar::new(paths.info.clone());

        let stored = if opts.resume { sidecar.load()? } else { None };
        let resumed = stored.is_some();
        let (record, storage) = match stored {
            Some(record) => resume_record(&mut paths, record, &opts)?,
            None => start_fresh(&paths, &sidecar, &opts)?,
        };

        let lane_count = if record.size().is_none() {
            1
        } else {
            opts.lanes.max(1)
        };
        let block_size = opts.block_size.max(1);
        let cache_bytes = opts.cache_bytes_per_lane.max(1);

        let mut state = SaverState {
            finished: record.store_index.is_empty(),
            record,
            cursors: vec![LaneCursor::default(); lane_count],
            high_water: 0,
            flushes: 0,
        };
        for lane in 0..lane_count {
            state.assign(lane, block_size, cache_bytes);
        }

        tracing::info!(
            dest = %dest.display(),
            resumed,
            size = state.record.file_size,
            written = state.record.written_bytes,
            lanes = lane_count,
            "saver opened"
        );

        Ok(Saver {
            paths,
            sidecar,
            block_size,
            cache_bytes,
            lanes: (0..lane_count).map(|_| Mutex::default()).collect(),
            state: Mutex::new(state),
            storage: RwLock::new(Some(storage)),
            lifecycle: Mutex::new(Lifecycle {
                lock: Some(lock_file),
                completion: Completion::Pending,
            }),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of lanes (may be lower than requested: unknown size forces one).
    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn paths(&self) -> &SaverPaths {
        &self.paths
    }

    /// Submit `data` for `start` on `lane` and get the lane's next range.
    ///
    /// `start == None` only asks for the lane's current assignment (a lane
    /// with none is offered work first). A `start` other than the lane's
    /// assigned offset returns `RangeMismatch` without changing anything.
    /// When the last pending byte is committed, the lane that notices runs
    /// finalize (once) and every lane sees `Completed` or `ChecksumMismatch`.
    pub fn write_data(&self, lane: usize, start: Option<u64>, data: &[u8]) -> Result<WriteOutcome> {
        if lane >= self.lanes.len() {
            return Ok(WriteOutcome::idle(lane, WriteStatus::Ok));
        }
        if self.closed.load(Ordering::Acquire) {
            return self.terminal(lane);
        }

        let mut buf = lock(&self.lanes[lane]);
        let status = match start {
            Some(offset) => self.accept(lane, &mut buf, offset, data)?,
            None => WriteStatus::Ok,
        };

        let (cursor, finished) = {
            let mut st = lock(&self.state);
            if status == WriteStatus::Ok {
                st.assign(lane, self.block_size, self.cache_bytes);
            }
            (st.cursors[lane], st.finished)
        };
        drop(buf);

        if let Some(next) = cursor.fetch {
            return Ok(WriteOutcome {
                status,
                lane,
                next: Some(next),
            });
        }
        if finished {
            let status = self.finalize_once()?;
            return Ok(WriteOutcome::idle(lane, status));
        }
        Ok(WriteOutcome::idle(lane, status))
    }

    /// Declare an unknown-size transfer complete: flush, fix the size to what
    /// was written, and finalize.
    pub fn finished(&self) -> Result<WriteStatus> {
        if self.closed.load(Ordering::Acquire) {
            return self.terminal(0).map(|o| o.status);
        }
        if lock(&self.state).record.size().is_some() {
            return Err(TransferError::SizeAlreadyKnown);
        }
        self.flush()?;
        {
            let mut st = lock(&self.state);
            let written = st.record.written_bytes;
            st.record.set_size(Some(written));
            st.record.store_index.clear();
            st.cursors.iter_mut().for_each(LaneCursor::clear);
            st.finished = true;
            tracing::info!(dest = %self.paths.dest.display(), size = written, "unknown-size transfer marked finished");
        }
        self.finalize_once()
    }

    /// Commit every lane's buffered bytes regardless of the cache threshold.
    pub fn flush(&self) -> Result<()> {
        for (lane, slot) in self.lanes.iter().enumerate() {
            let mut buf = lock(slot);
            self.flush_lane(lane, &mut buf)?;
        }
        Ok(())
    }

    /// Flush, release the temp file and the lock marker. Idempotent.
    pub fn close(&self) -> Result<()> {
        // the first caller owns the teardown; later and concurrent callers return at once
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let flushed = self.flush();
        write(&self.storage).take();
        let released = {
            let mut life = lock(&self.lifecycle);
            self.release(&mut life)
        };
        tracing::debug!(dest = %self.paths.dest.display(), "saver closed");
        flushed.and(released)
    }

    pub fn get_save_info(&self) -> SaveInfo {
        let completion = lock(&self.lifecycle).completion;
        let st = lock(&self.state);
        SaveInfo {
            file_size: st.record.size(),
            written_bytes: st.record.written_bytes,
            checksum: st.record.checksum().map(str::to_string),
            flushes: st.flushes,
            remaining: st.record.store_index.ranges().to_vec(),
            completion,
        }
    }

    pub fn get_extended_info(&self) -> ExtendedInfo {
        lock(&self.state).record.extended_info.clone()
    }

    fn accept(&self, lane: usize, buf: &mut LaneBuffer, offset: u64, data: &[u8]) -> Result<WriteStatus> {
        let len = data.len() as u64;
        let (fetch, should_flush) = {
            let mut st = lock(&self.state);
            let known_size = st.record.size().is_some();
            let cur = &mut st.cursors[lane];
            let fetch = match cur.fetch {
                Some(f) if f.start == offset => f,
                other => {
                    tracing::debug!(lane, offset, expected = ?other.map(|f| f.start), "range mismatch");
                    return Ok(WriteStatus::RangeMismatch);
                }
            };
            if len == 0 {
                if known_size {
                    return Err(TransferError::EmptyData { lane, start: offset });
                }
                return Ok(WriteStatus::Ok);
            }
            if len > fetch.size {
                return Err(TransferError::LedgerConflict { start: offset, len });
            }
            cur.buffered += len;
            cur.fetch = None;
            (fetch, cur.buffered >= self.cache_bytes || cur.reached_end())
        };

        if buf.data.is_empty() {
            buf.start = offset;
        }
        buf.data.extend_from_slice(data);

        if should_flush {
            if let Err(e) = self.flush_lane(lane, buf) {
                buf.data.truncate(buf.data.len() - data.len());
                let mut st = lock(&self.state);
                let cur = &mut st.cursors[lane];
                cur.buffered -= len;
                cur.fetch = Some(fetch);
                return Err(e);
            }
        }
        Ok(WriteStatus::Ok)
    }

    /// Write the lane buffer to the temp file and commit it. The ledger and
    /// sidecar change together or not at all; the last commit (ledger empty)
    /// is not persisted because finalize removes the sidecar.
    fn flush_lane(&self, lane: usize, buf: &mut LaneBuffer) -> Result<()> {
        if buf.data.is_empty() {
            return Ok(());
        }
        let storage = self.storage()?;
        storage.write_at(buf.start, &buf.data)?;
        let len = buf.data.len() as u64;

        let mut st = lock(&self.state);
        let mut ledger = st.record.store_index.clone();
        if !ledger.commit(buf.start, len) {
            return Err(TransferError::LedgerConflict {
                start: buf.start,
                len,
            });
        }
        let written = st.record.written_bytes + len;
        if ledger.is_empty() {
            st.record.store_index = ledger;
            st.record.written_bytes = written;
            st.finished = true;
        } else {
            let next = TransferRecord {
                store_index: ledger,
                written_bytes: written,
                ..st.record.clone()
            };
            self.sidecar.store(&next)?;
            st.record = next;
        }
        st.flushes += 1;

        let cur = &mut st.cursors[lane];
        cur.start = Some(buf.start + len);
        cur.buffered = cur.buffered.saturating_sub(len);
        if cur.reached_end() {
            cur.clear();
        }
        tracing::trace!(lane, start = buf.start, len, "lane buffer flushed");

        buf.start += len;
        buf.data.clear();
        Ok(())
    }

    fn finalize_once(&self) -> Result<WriteStatus> {
        let mut life = lock(&self.lifecycle);
        match life.completion {
            Completion::Completed => return Ok(WriteStatus::Completed),
            Completion::Corrupt => return Ok(WriteStatus::ChecksumMismatch),
            Completion::Pending => {}
        }

        let storage = self.storage()?;
        storage.sync()?;
        let record = lock(&self.state).record.clone();
        if let Some(expected) = record.checksum() {
            let actual = checksum::sha256_path(storage.temp_path())?;
            if !actual.eq_ignore_ascii_case(expected) {
                tracing::warn!(
                    dest = %self.paths.dest.display(),
                    expected,
                    actual = %actual,
                    "checksum mismatch, keeping temp file and sidecar"
                );
                drop(storage);
                write(&self.storage).take();
                life.completion = Completion::Corrupt;
                self.sidecar.store(&record)?;
                self.release(&mut life)?;
                return Ok(WriteStatus::ChecksumMismatch);
            }
        }
        drop(storage);

        let writer = write(&self.storage).take().ok_or(TransferError::Closed)?;
        writer.finalize(&self.paths.dest)?;
        life.completion = Completion::Completed;
        self.sidecar.remove()?;
        self.release(&mut life)?;
        tracing::info!(
            dest = %self.paths.dest.display(),
            bytes = record.written_bytes,
            "transfer finalized"
        );
        Ok(WriteStatus::Completed)
    }

    fn release(&self, life: &mut Lifecycle) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if let Some(l) = life.lock.take() {
            l.release()?;
        }
        Ok(())
    }

    fn terminal(&self, lane: usize) -> Result<WriteOutcome> {
        match lock(&self.lifecycle).completion {
            Completion::Completed => Ok(WriteOutcome::idle(lane, WriteStatus::Completed)),
            Completion::Corrupt => Ok(WriteOutcome::idle(lane, WriteStatus::ChecksumMismatch)),
            Completion::Pending => Err(TransferError::Closed),
        }
    }

    fn storage(&self) -> Result<StorageWriter> {
        read(&self.storage).clone().ok_or(TransferError::Closed)
    }
}

impl Drop for Saver {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(dest = %self.paths.dest.display(), "saver close on drop failed: {}", e);
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Load a stored record, checking it against the caller's expectations and the temp file.
fn resume_record(
    paths: &mut SaverPaths,
    mut record: TransferRecord,
    opts: &SaverOptions,
) -> Result<(TransferRecord, StorageWriter)> {
    if let Some(size) = opts.expected_size {
        if record.size() != Some(size) {
            return Err(TransferError::InconsistentResume {
                field: "fileSize",
                stored: record.file_size.to_string(),
                supplied: size.to_string(),
            });
        }
    }
    if let Some(sum) = opts.expected_checksum.as_deref().filter(|s| !s.is_empty()) {
        if !sum.eq_ignore_ascii_case(&record.checksum) {
            return Err(TransferError::InconsistentResume {
                field: "checksum",
                stored: record.checksum.clone(),
                supplied: sum.to_string(),
            });
        }
    }

    paths.temp = paths.dir().join(&record.temp_file_name);
    if !paths.temp.exists() {
        return Err(TransferError::FileNotFound(paths.temp.clone()));
    }
    record.store_index.merge();
    let storage = StorageWriter::open_existing(&paths.temp)?;
    let expected = record.store_index.committed_end(record.size());
    let actual = storage.len()?;
    if actual < expected {
        return Err(TransferError::CorruptTempFile {
            path: paths.temp.clone(),
            expected,
            actual,
        });
    }
    Ok((record, storage))
}

/// Discard stale artifacts and create a new temp file plus sidecar.
fn start_fresh(
    paths: &SaverPaths,
    sidecar: &Sidecar,
    opts: &SaverOptions,
) -> Result<(TransferRecord, StorageWriter)> {
    remove_if_exists(&paths.temp)?;
    sidecar.remove()?;

    let size = opts.expected_size;
    let record = TransferRecord {
        temp_file_name: paths
            .temp
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: size.map_or(-1, |s| s as i64),
        written_bytes: 0,
        checksum: opts.expected_checksum.clone().unwrap_or_default(),
        extended_info: opts.extended_info.clone(),
        store_index: Ledger::full(size),
    };

    let mut builder = StorageWriterBuilder::create(&paths.temp)?;
    let prepared = match size {
        Some(n) if !opts.auto_expand => builder.preallocate(n).map_err(TransferError::from),
        _ => Ok(()),
    }
    .and_then(|()| sidecar.store(&record));
    if let Err(e) = prepared {
        let _ = remove_if_exists(&paths.temp);
        let _ = sidecar.remove();
        return Err(e);
    }
    Ok((record, builder.build()))
}
