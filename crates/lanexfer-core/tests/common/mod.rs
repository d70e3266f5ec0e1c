#![allow(dead_code)]

pub mod instrumented;
pub mod stream_endpoint;

use lanexfer_core::protocol::TransferOptions;
use lanexfer_core::saver::SaverOptions;
use std::path::{Path, PathBuf};

/// Writes a deterministic `len`-byte file and returns its path and contents.
pub fn write_source(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let body: Vec<u8> = (0u8..=250).cycle().take(len).collect();
    let path = dir.join(name);
    std::fs::write(&path, &body).unwrap();
    (path, body)
}

pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

pub fn options(lanes: usize, block_size: u64, cache_bytes: u64) -> TransferOptions {
    TransferOptions {
        saver: SaverOptions {
            lanes,
            block_size,
            cache_bytes_per_lane: cache_bytes,
            ..SaverOptions::default()
        },
        verify_checksum: true,
    }
}
