// Durable append and sequential read for one partition. Appends are
// serialized by holding `next_offset` locked for the whole critical
// section: reading the cache, writing the record file, and advancing the
// watermark all happen under one lock acquisition, which is also what
// gives us "at most one producer thread mutates partition p at a time."
//
// The durability contract is the ordering of two writes: the record file
// is created and fsynced *before* the watermark is rewritten to point past
// it. A crash between those two steps leaves a record file with an offset
// one past the watermark; recovery (and every reader) ignores it, and the
// next `append` simply overwrites it when it reassigns that offset.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, instrument};

use broker_base::{atomic_write, pad20, Error, Result};

use crate::record;

pub struct PartitionStore {
    partition: u32,
    dir: PathBuf,
    next_offset: Mutex<u64>,
}

impl PartitionStore {
    #[instrument(level = "debug", skip_all, fields(partition))]
    pub fn open(dir: PathBuf, partition: u32) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| Error::storage_unavailable(&dir, e))?;
        let watermark_path = dir.join("next_offset");
        let watermark = load_watermark(&watermark_path)?;
        debug!(partition, watermark, "opened partition store");
        Ok(PartitionStore {
            partition,
            dir,
            next_offset: Mutex::new(watermark),
        })
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    #[instrument(level = "debug", skip(self, key, payload), fields(partition = self.partition))]
    pub fn append(&self, key: &[u8], payload: &[u8]) -> Result<u64> {
        let mut guard = self
            .next_offset
            .lock()
            .map_err(|_| Error::corruption(&self.dir, "partition mutex poisoned"))?;

        let offset = *guard + 1;
        let record_path = self.dir.join(format!("{}.msg", pad20(offset)));
        write_record_file(&record_path, &record::encode(key, payload))
            .map_err(|e| Error::storage_unavailable(&record_path, e))?;
        sync_dir_best_effort(&self.dir);

        let watermark_path = self.dir.join("next_offset");
        atomic_write(
            &watermark_path,
            offset.to_string().as_bytes(),
            &format!("pid{}", std::process::id()),
        )?;

        *guard = offset;
        debug!(partition = self.partition, offset, "appended");
        Ok(offset)
    }

    /// Returns `None` when the offset hasn't been produced yet (the reader
    /// has caught up to the producer) or lies past the persisted watermark.
    /// The watermark check matters on recovery: a torn crash can leave a
    /// record file one past the watermark it predates, and that file must
    /// stay invisible until a fresh `append` reclaims its offset. This
    /// holds no lock otherwise: reading a file at or below the watermark
    /// races harmlessly with `append`, since record files are always
    /// written before the watermark advances past them.
    pub fn read(&self, offset: u64) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if offset > self.high_watermark() {
            return Ok(None);
        }
        let path = self.dir.join(format!("{}.msg", pad20(offset)));
        match fs::read(&path) {
            Ok(bytes) => match record::decode(&bytes) {
                Some(pair) => Ok(Some(pair)),
                None => Err(Error::corruption(&path, "record frame truncated")),
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::corruption(&path, e.to_string())),
        }
    }

    pub fn high_watermark(&self) -> u64 {
        *self.next_offset.lock().unwrap_or_else(|p| p.into_inner())
    }
}

fn write_record_file(path: &PathBuf, bytes: &[u8]) -> io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

fn sync_dir_best_effort(dir: &PathBuf) {
    if let Ok(d) = File::open(dir) {
        let _ = d.sync_all();
    }
}

fn load_watermark(path: &PathBuf) -> Result<u64> {
    match fs::read_to_string(path) {
        Ok(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::corruption(path, format!("unparseable watermark: {s:?}"))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(Error::storage_unavailable(path, e)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test_log::test]
    fn append_assigns_increasing_offsets_from_one() {
        let dir = tempdir().unwrap();
        let store = PartitionStore::open(dir.path().join("partition-0"), 0).unwrap();
        assert_eq!(store.append(b"k1", b"v1").unwrap(), 1);
        assert_eq!(store.append(b"k2", b"v2").unwrap(), 2);
        assert_eq!(store.append(b"k3", b"v3").unwrap(), 3);
        assert_eq!(store.high_watermark(), 3);
    }

    #[test_log::test]
    fn read_returns_what_was_appended() {
        let dir = tempdir().unwrap();
        let store = PartitionStore::open(dir.path().join("partition-0"), 0).unwrap();
        let offset = store.append(b"key", b"payload").unwrap();
        let (key, payload) = store.read(offset).unwrap().unwrap();
        assert_eq!(key, b"key");
        assert_eq!(payload, b"payload");
    }

    #[test_log::test]
    fn read_past_watermark_is_empty() {
        let dir = tempdir().unwrap();
        let store = PartitionStore::open(dir.path().join("partition-0"), 0).unwrap();
        store.append(b"k", b"v").unwrap();
        assert_eq!(store.read(5).unwrap(), None);
    }

    #[test_log::test]
    fn recovers_watermark_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partition-0");
        {
            let store = PartitionStore::open(path.clone(), 0).unwrap();
            store.append(b"k1", b"v1").unwrap();
            store.append(b"k2", b"v2").unwrap();
        }
        let reopened = PartitionStore::open(path, 0).unwrap();
        assert_eq!(reopened.high_watermark(), 2);
        assert_eq!(reopened.append(b"k3", b"v3").unwrap(), 3);
    }

    #[test_log::test]
    fn stale_record_past_watermark_is_ignored_then_overwritten() {
        // Simulate a torn crash: a record file exists one past the
        // persisted watermark (as if the process died after writing the
        // record but before advancing next_offset).
        let dir = tempdir().unwrap();
        let path = dir.path().join("partition-0");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("next_offset"), "98").unwrap();
        write_record_file(&path.join(format!("{}.msg", pad20(99))), &record::encode(b"k", b"stale"))
            .unwrap();

        let store = PartitionStore::open(path, 0).unwrap();
        assert_eq!(store.high_watermark(), 98);
        assert_eq!(store.read(99).unwrap(), None, "stale file must not be visible");

        let offset = store.append(b"k2", b"fresh").unwrap();
        assert_eq!(offset, 99);
        let (_, payload) = store.read(99).unwrap().unwrap();
        assert_eq!(payload, b"fresh", "stale file must be overwritten");
    }

    #[test_log::test]
    fn unparseable_watermark_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partition-0");
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("next_offset"), "not-a-number").unwrap();
        let err = PartitionStore::open(path, 0).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }
}
