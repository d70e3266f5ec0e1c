pub mod config;
pub mod logging;

pub mod checksum;
pub mod error;
pub mod ledger;
pub mod protocol;
pub mod saver;
pub mod service;
pub mod storage;
pub mod transfer;

mod sync;

pub use error::{Result, TransferError};
pub use protocol::{LocalProtocol, Protocol, PullProtocol, PushProtocol, Source, TransferOptions};
pub use saver::{Saver, SaverOptions, WriteStatus};
pub use transfer::{ProgressStats, SessionStatus, Transfer};
