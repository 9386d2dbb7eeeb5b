// Routing and lifecycle of the N PartitionStores. This is the sole
// legitimate path by which new records enter the system.

use std::path::PathBuf;

use tracing::info;

use broker_base::{partition_dir, partition_for_key, Result};

use crate::PartitionStore;

pub struct PartitionedLog {
    root: PathBuf,
    stores: Vec<PartitionStore>,
}

impl PartitionedLog {
    pub fn open(root: impl Into<PathBuf>, partitions: u32) -> Result<Self> {
        assert!(partitions > 0, "partition count must be nonzero");
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| broker_base::Error::storage_unavailable(&root, e))?;

        let mut stores = Vec::with_capacity(partitions as usize);
        for p in 0..partitions {
            stores.push(PartitionStore::open(partition_dir(&root, p), p)?);
        }
        info!(root = %root.display(), partitions, "opened partitioned log");
        Ok(PartitionedLog { root, stores })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn partition_count(&self) -> u32 {
        self.stores.len() as u32
    }

    /// Routes `key` to a partition by stable hash and appends `payload`.
    pub fn produce(&self, key: &[u8], payload: &[u8]) -> Result<(u32, u64)> {
        let p = partition_for_key(key, self.partition_count());
        let offset = self.stores[p as usize].append(key, payload)?;
        Ok((p, offset))
    }

    pub fn read(&self, partition: u32, offset: u64) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.stores[partition as usize].read(offset)
    }

    pub fn high_watermark(&self, partition: u32) -> u64 {
        self.stores[partition as usize].high_watermark()
    }

    pub fn high_watermarks(&self) -> Vec<u64> {
        self.stores.iter().map(PartitionStore::high_watermark).collect()
    }
}
