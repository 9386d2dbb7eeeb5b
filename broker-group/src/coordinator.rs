// Serializes all mutations of one group's membership, assignment, and
// generation behind a single exclusive file lock. Every transaction reads
// the current state, mutates in memory, then commits by writing members,
// then assignment, then — last — generation, via atomic rename. Any
// reader that observes a new generation is therefore guaranteed to see
// the assignment that goes with it.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::info;

use broker_base::{atomic_write, read_to_string_opt, AssignorKind, Error, Result};

use crate::assignor;
use crate::lock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberMetadata {
    pub host: String,
    pub pid: u32,
    pub joined_at_millis: u64,
}

impl MemberMetadata {
    pub fn here(pid: u32) -> Self {
        MemberMetadata {
            host: hostname(),
            pid,
            joined_at_millis: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

pub struct GroupCoordinator {
    group: String,
    group_dir: PathBuf,
    lock_path: PathBuf,
    partitions: u32,
    assignor_kind: AssignorKind,
    lock_wait_timeout: Duration,
}

impl GroupCoordinator {
    pub fn open(
        root: impl AsRef<Path>,
        group: impl Into<String>,
        partitions: u32,
        assignor_kind: AssignorKind,
        lock_wait_timeout: Duration,
    ) -> Result<Self> {
        let group = group.into();
        let group_dir = root.as_ref().join("consumer-groups").join(&group);
        std::fs::create_dir_all(group_dir.join("members"))
            .map_err(|e| Error::storage_unavailable(&group_dir, e))?;
        let lock_path = group_dir.join("coordinator.lock");
        Ok(GroupCoordinator {
            group,
            group_dir,
            lock_path,
            partitions,
            assignor_kind,
            lock_wait_timeout,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    fn members_dir(&self) -> PathBuf {
        self.group_dir.join("members")
    }

    fn generation_path(&self) -> PathBuf {
        self.group_dir.join("generation")
    }

    fn assignment_path(&self) -> PathBuf {
        self.group_dir.join("assignment")
    }

    fn member_path(&self, member_id: &str) -> PathBuf {
        self.members_dir().join(member_id)
    }

    fn list_member_ids(&self) -> Result<Vec<String>> {
        let dir = self.members_dir();
        let entries = std::fs::read_dir(&dir).map_err(|e| Error::storage_unavailable(&dir, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage_unavailable(&dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn read_generation(&self) -> Result<u64> {
        let path = self.generation_path();
        match read_to_string_opt(&path).map_err(|e| Error::storage_unavailable(&path, e))? {
            None => Ok(0),
            Some(s) => s
                .trim()
                .parse::<u64>()
                .map_err(|_| Error::corruption(&path, format!("unparseable generation: {s:?}"))),
        }
    }

    fn read_assignment(&self) -> Result<BTreeMap<String, Vec<u32>>> {
        let path = self.assignment_path();
        match read_to_string_opt(&path).map_err(|e| Error::storage_unavailable(&path, e))? {
            None => Ok(BTreeMap::new()),
            Some(s) => serde_json::from_str(&s)
                .map_err(|e| Error::corruption(&path, format!("unparseable assignment: {e}"))),
        }
    }

    fn write_assignment(&self, assignment: &BTreeMap<String, Vec<u32>>, writer: &str) -> Result<()> {
        let bytes = serde_json::to_vec(assignment)
            .expect("assignment map serialization cannot fail");
        atomic_write(&self.assignment_path(), &bytes, writer)
    }

    fn write_generation(&self, generation: u64, writer: &str) -> Result<()> {
        atomic_write(&self.generation_path(), generation.to_string().as_bytes(), writer)
    }

    fn recompute_and_commit(
        &self,
        members_now: Vec<String>,
        old_generation: u64,
        writer: &str,
    ) -> Result<(u64, BTreeMap<String, Vec<u32>>)> {
        let assignment = assignor::assign(self.assignor_kind, &members_now, self.partitions);
        let new_generation = old_generation + 1;
        // Assignment before generation: a reader observing the new
        // generation is guaranteed to see the assignment that goes with it.
        self.write_assignment(&assignment, writer)?;
        self.write_generation(new_generation, writer)?;
        info!(
            group = %self.group,
            generation = new_generation,
            members = members_now.len(),
            "rebalanced"
        );
        Ok((new_generation, assignment))
    }

    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = lock::acquire(&self.lock_path, self.lock_wait_timeout)?;
        f()
    }

    /// Adds `member_id`, recomputes assignment over the new member set,
    /// bumps generation. Returns the new generation and this member's
    /// owned partitions.
    pub fn join(&self, member_id: &str, metadata: &MemberMetadata) -> Result<(u64, Vec<u32>)> {
        self.with_lock(|| {
            let bytes = serde_json::to_vec(metadata).expect("MemberMetadata serialization cannot fail");
            atomic_write(&self.member_path(member_id), &bytes, member_id)?;

            let members_now = self.list_member_ids()?;
            let old_generation = self.read_generation()?;
            let (generation, assignment) =
                self.recompute_and_commit(members_now, old_generation, member_id)?;
            let owned = assignment.get(member_id).cloned().unwrap_or_default();
            Ok((generation, owned))
        })
    }

    /// Removes `member_id` and its heartbeat, recomputes, bumps generation.
    pub fn leave(&self, member_id: &str, heartbeats_dir: &Path) -> Result<()> {
        self.with_lock(|| {
            remove_if_present(&self.member_path(member_id))?;
            remove_if_present(&heartbeats_dir.join(format!("{member_id}.heartbeat")))?;

            let members_now = self.list_member_ids()?;
            let old_generation = self.read_generation()?;
            self.recompute_and_commit(members_now, old_generation, member_id)?;
            Ok(())
        })
    }

    /// Removes every member in `expired` that is still present, and its
    /// heartbeat file. If none of `expired` are still present (another
    /// member already evicted them), this is a no-op: no generation bump.
    pub fn evict(&self, expired: &HashSet<String>, heartbeats_dir: &Path, evictor: &str) -> Result<()> {
        self.with_lock(|| {
            let current = self.list_member_ids()?;
            let present: Vec<&String> = current.iter().filter(|m| expired.contains(*m)).collect();
            if present.is_empty() {
                return Ok(());
            }
            for member_id in &present {
                remove_if_present(&self.member_path(member_id))?;
                remove_if_present(&heartbeats_dir.join(format!("{member_id}.heartbeat")))?;
            }

            let members_now = self.list_member_ids()?;
            let old_generation = self.read_generation()?;
            self.recompute_and_commit(members_now, old_generation, evictor)?;
            Ok(())
        })
    }

    /// Read-only view of the atomically committed state.
    pub fn snapshot(&self) -> Result<(u64, BTreeMap<String, Vec<u32>>)> {
        self.with_lock(|| {
            let generation = self.read_generation()?;
            let assignment = self.read_assignment()?;
            Ok((generation, assignment))
        })
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::storage_unavailable(path, e)),
    }
}
