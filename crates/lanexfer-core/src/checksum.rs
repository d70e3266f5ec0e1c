//! SHA-256 checksums for source verification and finalize.
//!
//! Computed on demand over whole files, never inline with lane writes, so
//! verification does not slow the transfer itself.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const BUF_SIZE: usize = 64 * 1024;

/// Compute SHA-256 of a file and return the digest as lowercase hex.
pub fn sha256_path(path: &Path) -> io::Result<String> {
    let mut f = File::open(path)?;
    sha256_stream(&mut f)
}

/// Hash an already-open seekable source from offset 0, then rewind it.
pub fn sha256_reader<R: Read + Seek + ?Sized>(reader: &mut R) -> io::Result<String> {
    reader.seek(SeekFrom::Start(0))?;
    let digest = sha256_stream(reader)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(digest)
}

fn sha256_stream<R: Read + ?Sized>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
