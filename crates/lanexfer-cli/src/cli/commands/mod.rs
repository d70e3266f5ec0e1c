//! CLI command handlers, one per file.

mod checksum;
mod copy;
mod status;

pub use checksum::run_checksum;
pub use copy::{run_copy, CopyArgs};
pub use status::run_status;
