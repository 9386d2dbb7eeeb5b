// Durable per-partition committed-offset storage for one consumer group.
// No ownership check happens here — that's enforced one layer up by the
// consumer member, which only calls `commit` for partitions it currently
// owns in the current generation.

use std::path::{Path, PathBuf};

use tracing::debug;

use broker_base::{atomic_write, read_to_string_opt, Error, Result};

pub struct OffsetStore {
    dir: PathBuf,
}

impl OffsetStore {
    pub fn open(root: impl AsRef<Path>, group: &str) -> Result<Self> {
        let dir = root.as_ref().join("consumer-groups").join(group).join("offsets");
        std::fs::create_dir_all(&dir).map_err(|e| Error::storage_unavailable(&dir, e))?;
        Ok(OffsetStore { dir })
    }

    fn path(&self, partition: u32) -> PathBuf {
        self.dir.join(format!("partition-{partition}.offset"))
    }

    /// Returns 0 when the file is absent (a fresh partition for this group).
    pub fn load(&self, partition: u32) -> Result<u64> {
        let path = self.path(partition);
        match read_to_string_opt(&path).map_err(|e| Error::storage_unavailable(&path, e))? {
            None => Ok(0),
            Some(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::corruption(&path, format!("unparseable offset: {s:?}"))),
        }
    }

    /// Writes the offset atomically with respect to concurrent readers.
    /// `writer_id` (typically the member id) disambiguates the temp file
    /// name so two members racing during a rebalance window never collide
    /// on the same sibling path.
    pub fn commit(&self, partition: u32, offset: u64, writer_id: &str) -> Result<()> {
        let path = self.path(partition);
        atomic_write(&path, offset.to_string().as_bytes(), writer_id)?;
        debug!(partition, offset, writer_id, "committed offset");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test_log::test]
    fn load_absent_partition_is_zero() {
        let dir = tempdir().unwrap();
        let store = OffsetStore::open(dir.path(), "group-a").unwrap();
        assert_eq!(store.load(0).unwrap(), 0);
    }

    #[test_log::test]
    fn commit_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = OffsetStore::open(dir.path(), "group-a").unwrap();
        store.commit(2, 157, "member-a").unwrap();
        assert_eq!(store.load(2).unwrap(), 157);
        store.commit(2, 158, "member-a").unwrap();
        assert_eq!(store.load(2).unwrap(), 158);
    }

    #[test_log::test]
    fn groups_are_isolated() {
        let dir = tempdir().unwrap();
        let a = OffsetStore::open(dir.path(), "group-a").unwrap();
        let b = OffsetStore::open(dir.path(), "group-b").unwrap();
        a.commit(0, 10, "m1").unwrap();
        assert_eq!(b.load(0).unwrap(), 0);
    }

    #[test_log::test]
    fn unparseable_offset_is_corruption() {
        let dir = tempdir().unwrap();
        let store = OffsetStore::open(dir.path(), "group-a").unwrap();
        std::fs::write(store.path(3), "garbage").unwrap();
        assert!(matches!(store.load(3), Err(Error::Corruption { .. })));
    }
}
