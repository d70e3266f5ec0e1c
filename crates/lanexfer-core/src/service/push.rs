//! Saver sessions for clients pushing a file in.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::reaper::Reap;
use super::root::Root;
use super::{InitSaver, SaverEndpoint, SessionInfo};
use crate::config::ServiceConfig;
use crate::error::{Result, TransferError};
use crate::saver::{ExtendedInfo, SaveInfo, Saver, SaverOptions, WriteOutcome, WriteStatus};
use crate::sync::lock;

struct PushSession {
    saver: Saver,
    last_used: Mutex<Instant>,
}

impl PushSession {
    fn touch(&self) {
        *lock(&self.last_used) = Instant::now();
    }
}

/// Hosts one [`Saver`] per push session, keyed by a random session id.
pub struct PushService {
    root: Root,
    config: ServiceConfig,
    sessions: Mutex<HashMap<String, Arc<PushSession>>>,
}

impl PushService {
    pub fn new(root: &Path, config: ServiceConfig) -> Result<Self> {
        Ok(Self {
            root: Root::new(root, config.confine_to_root)?,
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.root.dir()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn session(&self, id: &str) -> Option<Arc<PushSession>> {
        let s = lock(&self.sessions).get(id).cloned();
        if let Some(s) = &s {
            s.touch();
        }
        s
    }

    fn require(&self, id: &str) -> Result<Arc<PushSession>> {
        self.session(id)
            .ok_or_else(|| TransferError::UnknownSession(id.to_string()))
    }
}

impl SaverEndpoint for PushService {
    fn init_saver(&self, req: InitSaver) -> Result<SessionInfo> {
        let dest = self.root.resolve(&req.path)?;
        let lanes = self.config.cap_lanes(req.lanes.max(1));
        let cache_bytes = self.config.cap_cache(req.cache_bytes.max(1));
        let saver = Saver::create(
            &dest,
            SaverOptions {
                resume: req.resume,
                expected_size: req.size,
                expected_checksum: req.checksum,
                overwrite: req.overwrite,
                lanes,
                block_size: req.block_size,
                cache_bytes_per_lane: cache_bytes,
                auto_expand: req.auto_expand,
                extended_info: req.extended_info,
                ..SaverOptions::default()
            },
        )?;

        let session_id = uuid::Uuid::new_v4().to_string();
        let lane_count = saver.lane_count();
        let session = Arc::new(PushSession {
            saver,
            last_used: Mutex::new(Instant::now()),
        });
        lock(&self.sessions).insert(session_id.clone(), session);
        tracing::info!(
            session = %session_id,
            dest = %dest.display(),
            lanes = lane_count,
            "push session opened"
        );
        Ok(SessionInfo {
            session_id,
            lane_count,
        })
    }

    fn write_data(&self, session: &str, lane: usize, start: Option<u64>, data: &[u8]) -> Result<WriteOutcome> {
        match self.session(session) {
            Some(s) => s.saver.write_data(lane, start, data),
            None => {
                tracing::debug!(session, lane, "write to unknown session, no more work");
                Ok(WriteOutcome::idle(lane, WriteStatus::Ok))
            }
        }
    }

    fn flush(&self, session: &str) -> Result<()> {
        self.require(session)?.saver.flush()
    }

    fn finished(&self, session: &str) -> Result<WriteStatus> {
        self.require(session)?.saver.finished()
    }

    /// Closing an unknown (already closed or reaped) session is a no-op.
    fn close(&self, session: &str) -> Result<()> {
        let removed = lock(&self.sessions).remove(session);
        match removed {
            Some(s) => {
                tracing::info!(session, "push session closed");
                s.saver.close()
            }
            None => Ok(()),
        }
    }

    fn get_save_info(&self, session: &str) -> Result<SaveInfo> {
        Ok(self.require(session)?.saver.get_save_info())
    }

    fn get_extended_info(&self, session: &str) -> Result<ExtendedInfo> {
        Ok(self.require(session)?.saver.get_extended_info())
    }
}

impl Reap for PushService {
    fn reap_idle(&self) -> usize {
        let timeout = self.config.idle_timeout();
        let expired: Vec<(String, Arc<PushSession>)> = {
            let mut sessions = lock(&self.sessions);
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| lock(&s.last_used).elapsed() >= timeout)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| sessions.remove(&id).map(|s| (id, s)))
                .collect()
        };
        for (id, s) in &expired {
            tracing::info!(session = %id, "closing idle push session");
            if let Err(e) = s.saver.close() {
                tracing::warn!(session = %id, "idle session close failed: {}", e);
            }
        }
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(path: &str, size: u64) -> InitSaver {
        InitSaver {
            path: PathBuf::from(path),
            resume: true,
            size: Some(size),
            checksum: None,
            overwrite: false,
            extended_info: ExtendedInfo::new(),
            lanes: 8,
            block_size: 16,
            cache_bytes: 1 << 20,
            auto_expand: true,
        }
    }

    #[test]
    fn caps_lanes_and_rejects_escapes() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PushService::new(
            dir.path(),
            ServiceConfig {
                max_lanes: 2,
                ..Default::default()
            },
        )
        .unwrap();
        let info = svc.init_saver(request("a.bin", 64)).unwrap();
        assert_eq!(info.lane_count, 2);
        assert_eq!(svc.session_count(), 1);

        let err = svc.init_saver(request("../escape.bin", 64)).unwrap_err();
        assert!(matches!(err, TransferError::OutsideRoot(_)));
    }

    #[test]
    fn unknown_session_means_no_more_work() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PushService::new(dir.path(), ServiceConfig::default()).unwrap();
        let out = svc.write_data("nope", 0, Some(0), b"x").unwrap();
        assert_eq!(out.status, WriteStatus::Ok);
        assert_eq!(out.next_start(), -1);
        assert!(matches!(svc.flush("nope"), Err(TransferError::UnknownSession(_))));
        svc.close("nope").unwrap();
    }

    #[test]
    fn session_writes_through_to_saver() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PushService::new(dir.path(), ServiceConfig::default()).unwrap();
        let info = svc.init_saver(InitSaver { lanes: 1, ..request("b.bin", 20) }).unwrap();
        let id = info.session_id.as_str();

        let mut out = svc.write_data(id, 0, None, &[]).unwrap();
        while let Some(f) = out.next {
            out = svc.write_data(id, 0, Some(f.start), &vec![3u8; f.size as usize]).unwrap();
        }
        assert_eq!(out.status, WriteStatus::Completed);
        assert_eq!(svc.get_save_info(id).unwrap().written_bytes, 20);
        svc.close(id).unwrap();
        assert_eq!(svc.session_count(), 0);
        assert_eq!(std::fs::read(dir.path().join("b.bin")).unwrap(), vec![3u8; 20]);
    }

    #[test]
    fn idle_sessions_are_reaped() {
        let dir = tempfile::tempdir().unwrap();
        let svc = PushService::new(
            dir.path(),
            ServiceConfig {
                idle_timeout_secs: 0,
                ..Default::default()
            },
        )
        .unwrap();
        let info = svc.init_saver(request("c.bin", 64)).unwrap();
        assert_eq!(svc.reap_idle(), 1);
        assert_eq!(svc.session_count(), 0);
        assert!(!dir.path().join("c.bin.lock").exists());
        // the sidecar survives so the client can resume
        assert!(dir.path().join("c.bin.info").exists());
        assert!(matches!(
            svc.get_save_info(&info.session_id),
            Err(TransferError::UnknownSession(_))
        ));
    }
}
