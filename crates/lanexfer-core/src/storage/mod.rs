//! Temp-file I/O and lifecycle.
//!
//! Pre-allocates the temp file (fallocate on Unix when available, else
//! set_len), supports concurrent offset writes from every lane (pwrite), and
//! finalizes by renaming the temp file over the destination.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

use std::path::{Path, PathBuf};

/// Appends `.{ext}` to the full file name (`file.iso` + `tmp` → `file.iso.tmp`).
pub fn sibling_path(path: &Path, ext: &str) -> PathBuf {
    let mut o = path.as_os_str().to_owned();
    o.push(".");
    o.push(ext);
    PathBuf::from(o)
}
