// Configuration surface enumerated by the external interfaces section:
// partition count, heartbeat/session timing, assignor strategy, idle poll
// interval, plus the root directory every crate in this workspace needs to
// find its files under.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("session_timeout ({session_timeout:?}) must be at least 3x heartbeat_interval ({heartbeat_interval:?})")]
    SessionTimeoutTooShort {
        session_timeout: Duration,
        heartbeat_interval: Duration,
    },
    #[error("partitions must be nonzero")]
    ZeroPartitions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignorKind {
    RoundRobin,
    Range,
}

impl Default for AssignorKind {
    fn default() -> Self {
        AssignorKind::RoundRobin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Root directory for the partitioned log and all consumer-group state.
    pub root: PathBuf,

    /// Immutable for the lifetime of a log instance at a given root.
    pub partitions: u32,

    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,

    #[serde(with = "humantime_serde", default = "default_session_timeout")]
    pub session_timeout: Duration,

    #[serde(default)]
    pub assignor: AssignorKind,

    #[serde(with = "humantime_serde", default = "default_idle_poll_interval")]
    pub idle_poll_interval: Duration,

    /// Bound on how long a member will block trying to acquire the
    /// coordinator lock before surfacing `LockContention` (spec leaves this
    /// implementation-defined; we default it off `heartbeat_interval`).
    #[serde(with = "humantime_serde", default)]
    pub lock_wait_timeout: Option<Duration>,
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_poll_interval() -> Duration {
    Duration::from_millis(100)
}

impl BrokerConfig {
    pub fn new(root: impl Into<PathBuf>, partitions: u32) -> Self {
        BrokerConfig {
            root: root.into(),
            partitions,
            heartbeat_interval: default_heartbeat_interval(),
            session_timeout: default_session_timeout(),
            assignor: AssignorKind::default(),
            idle_poll_interval: default_idle_poll_interval(),
            lock_wait_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.partitions == 0 {
            return Err(ConfigError::ZeroPartitions);
        }
        if self.session_timeout < self.heartbeat_interval * 3 {
            return Err(ConfigError::SessionTimeoutTooShort {
                session_timeout: self.session_timeout,
                heartbeat_interval: self.heartbeat_interval,
            });
        }
        Ok(())
    }

    pub fn lock_wait_timeout(&self) -> Duration {
        self.lock_wait_timeout
            .unwrap_or(self.heartbeat_interval * 5)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_satisfy_the_3x_relationship() {
        let cfg = BrokerConfig::new("/tmp/does-not-matter", 4);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_partitions_rejected() {
        let cfg = BrokerConfig::new("/tmp/x", 0);
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroPartitions)));
    }

    #[test]
    fn short_session_timeout_rejected() {
        let mut cfg = BrokerConfig::new("/tmp/x", 4);
        cfg.session_timeout = Duration::from_secs(1);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::SessionTimeoutTooShort { .. })
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = BrokerConfig::new("/tmp/x", 8);
        let s = toml::to_string(&cfg).unwrap();
        let back: BrokerConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.partitions, 8);
        assert_eq!(back.heartbeat_interval, cfg.heartbeat_interval);
    }
}
