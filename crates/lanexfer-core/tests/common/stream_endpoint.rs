//! In-memory pull endpoint that cannot report its size up front.

use std::path::Path;
use std::sync::Mutex;

use lanexfer_core::service::SourceEndpoint;
use lanexfer_core::{Result, TransferError};

pub struct StreamEndpoint {
    body: Vec<u8>,
    open: Mutex<usize>,
}

impl StreamEndpoint {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            open: Mutex::new(0),
        }
    }

    pub fn open_handles(&self) -> usize {
        *self.open.lock().unwrap()
    }
}

impl SourceEndpoint for StreamEndpoint {
    fn get_size(&self, _path: &Path) -> Result<Option<u64>> {
        Ok(None)
    }

    fn get_checksum(&self, _path: &Path) -> Result<String> {
        Ok(String::new())
    }

    fn open_handle(&self, _path: &Path) -> Result<String> {
        *self.open.lock().unwrap() += 1;
        Ok("stream".to_string())
    }

    fn close_handle(&self, _handle: &str) -> Result<()> {
        let mut open = self.open.lock().unwrap();
        *open = open.saturating_sub(1);
        Ok(())
    }

    fn read(&self, handle: &str, start: u64, size: u64) -> Result<Vec<u8>> {
        if handle != "stream" {
            return Err(TransferError::UnknownHandle(handle.to_string()));
        }
        let len = self.body.len() as u64;
        let from = start.min(len) as usize;
        let to = start.saturating_add(size).min(len) as usize;
        Ok(self.body[from..to].to_vec())
    }
}
