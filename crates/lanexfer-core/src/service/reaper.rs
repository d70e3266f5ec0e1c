//! Background thread closing idle sessions and handles.

use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

/// Something holding idle-expirable entries.
pub trait Reap: Send + Sync + 'static {
    /// Close entries idle past the timeout; returns how many were closed.
    fn reap_idle(&self) -> usize;
}

/// Runs `reap_idle` every interval until stopped or the target is dropped.
pub struct Reaper {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    pub fn spawn<T: Reap>(target: &Arc<T>, every: Duration) -> Self {
        let weak: Weak<T> = Arc::downgrade(target);
        let (tx, rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || loop {
            match rx.recv_timeout(every) {
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    let Some(target) = weak.upgrade() else {
                        break;
                    };
                    let n = target.reap_idle();
                    if n > 0 {
                        tracing::debug!(closed = n, "reaped idle entries");
                    }
                }
                _ => break,
            }
        });
        Self {
            stop: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
