// Error kinds surfaced to callers, per the error handling design: producers
// get synchronous returns, consumers branch on `NotOwner` /
// `RebalanceInProgress` to decide whether to rejoin rather than treating
// every failure alike.

use std::path::PathBuf;

use thiserror::Error as ThisError;
use tracing::{debug, error};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    /// A filesystem write failed. Producers surface this to their caller;
    /// consumer readers exit and await rejoin.
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A watermark, generation, or offset file is present but unparseable.
    /// Fatal to the affected component; never silently coerced to 0.
    #[error("corrupt on-disk state at {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    /// Commit attempted for a partition not owned in the current generation.
    /// Expected during rebalance; the caller discards the commit.
    #[error("not owner of partition {partition} in generation {generation}")]
    NotOwner { partition: u32, generation: u64 },

    /// Returned by reader loops to their supervisor to trigger rejoin.
    /// Never surfaced outside the consumer.
    #[error("rebalance in progress")]
    RebalanceInProgress,

    /// Transient failure to acquire the coordinator lock within the
    /// configured bound. The caller retries.
    #[error("timed out acquiring lock at {path}")]
    LockContention { path: PathBuf },
}

impl Error {
    pub fn storage_unavailable(path: impl Into<PathBuf>, source: std::io::Error) -> Error {
        let path = path.into();
        error!(target: "broker", path = %path.display(), %source, "storage unavailable");
        Error::StorageUnavailable { path, source }
    }

    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Error {
        let path = path.into();
        let reason = reason.into();
        error!(target: "broker", path = %path.display(), %reason, "corrupt on-disk state");
        Error::Corruption { path, reason }
    }

    pub fn not_owner(partition: u32, generation: u64) -> Error {
        debug!(target: "broker", partition, generation, "commit rejected: not owner");
        Error::NotOwner { partition, generation }
    }

    pub fn lock_contention(path: impl Into<PathBuf>) -> Error {
        Error::LockContention { path: path.into() }
    }
}
