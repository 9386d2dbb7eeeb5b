mod offset_store;
mod partition_store;
mod partitioned_log;
mod record;

pub use offset_store::OffsetStore;
pub use partition_store::PartitionStore;
pub use partitioned_log::PartitionedLog;
pub use record::Record;
