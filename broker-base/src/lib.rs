mod config;
mod error;
mod fsutil;
mod hash;

pub use config::{AssignorKind, BrokerConfig, ConfigError};
pub use error::{Error, Result};
pub use fsutil::{atomic_write, pad20, partition_dir, read_to_string_opt, PARTITION_DIR_PREFIX};
pub use hash::{partition_for_key, stable_hash};
