// Facade wiring `PartitionedLog`, `GroupCoordinator`, and
// `ConsumerGroupMember` behind the two operations an ingestion layer
// actually needs: `produce` and `subscribe`.

mod error;

pub use broker_base::{AssignorKind, BrokerConfig};
pub use broker_consumer::{ConsumerGroupMember, Handler, HandlerError};
pub use broker_log::Record;
pub use error::{BrokerError, Result};

use std::collections::BTreeMap;
use std::sync::Arc;

use broker_group::GroupCoordinator;
use broker_log::PartitionedLog;

pub struct Broker {
    config: BrokerConfig,
    log: Arc<PartitionedLog>,
}

impl Broker {
    pub fn open(config: BrokerConfig) -> Result<Self> {
        config.validate()?;
        let log = PartitionedLog::open(&config.root, config.partitions)?;
        Ok(Broker {
            config,
            log: Arc::new(log),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Routes `key` to a partition by stable hash and appends `payload`.
    pub fn produce(&self, key: &[u8], payload: &[u8]) -> Result<(u32, u64)> {
        Ok(self.log.produce(key, payload)?)
    }

    pub fn partition_count(&self) -> u32 {
        self.log.partition_count()
    }

    pub fn high_watermarks(&self) -> Vec<u64> {
        self.log.high_watermarks()
    }

    /// Joins `group` as `member_id`, spawning reader threads for whatever
    /// partitions the coordinator assigns, and starts delivering records to
    /// `handler`. The handler must be idempotent: delivery is at least once.
    pub fn subscribe(
        &self,
        group: impl Into<String>,
        member_id: impl Into<String>,
        handler: Handler,
    ) -> Result<ConsumerGroupMember> {
        let lock_wait_timeout = self.config.lock_wait_timeout();
        Ok(ConsumerGroupMember::join(
            &self.config.root,
            group,
            member_id,
            Arc::clone(&self.log),
            self.config.partitions,
            self.config.assignor,
            self.config.heartbeat_interval,
            self.config.session_timeout,
            self.config.idle_poll_interval,
            lock_wait_timeout,
            handler,
        )?)
    }

    /// Current generation and assignment for `group`, for the CLI's
    /// `status` command and for operational inspection generally.
    pub fn group_status(&self, group: impl Into<String>) -> Result<(u64, BTreeMap<String, Vec<u32>>)> {
        let coordinator = GroupCoordinator::open(
            &self.config.root,
            group,
            self.config.partitions,
            self.config.assignor,
            self.config.lock_wait_timeout(),
        )?;
        Ok(coordinator.snapshot()?)
    }
}
