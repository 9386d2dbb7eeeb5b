// Publishes this member's liveness and lets any member observe peers'.
// Heartbeat files live at `<root>/.coordinator/heartbeats/<member-id>.heartbeat`,
// rewritten atomically on each tick, and removed when the member leaves.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use broker_base::{atomic_write, Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HeartbeatRecord {
    member_id: String,
    timestamp_millis: u64,
    generation: u64,
}

pub struct HeartbeatMonitor {
    dir: PathBuf,
    member_id: String,
    interval: Duration,
    session_timeout: Duration,
}

impl HeartbeatMonitor {
    pub fn new(root: impl AsRef<Path>, member_id: impl Into<String>, interval: Duration, session_timeout: Duration) -> Result<Self> {
        let dir = root.as_ref().join(".coordinator").join("heartbeats");
        std::fs::create_dir_all(&dir).map_err(|e| Error::storage_unavailable(&dir, e))?;
        Ok(HeartbeatMonitor {
            dir,
            member_id: member_id.into(),
            interval,
            session_timeout,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn path_for(&self, member_id: &str) -> PathBuf {
        self.dir.join(format!("{member_id}.heartbeat"))
    }

    /// Rewrite this member's own heartbeat file with the current time and
    /// the generation it currently believes it's in.
    pub fn beat(&self, generation: u64) -> Result<()> {
        let record = HeartbeatRecord {
            member_id: self.member_id.clone(),
            timestamp_millis: now_millis(),
            generation,
        };
        let bytes = serde_json::to_vec(&record)
            .expect("HeartbeatRecord serialization cannot fail");
        atomic_write(&self.path_for(&self.member_id), &bytes, &self.member_id)?;
        debug!(member_id = %self.member_id, generation, "heartbeat written");
        Ok(())
    }

    pub fn remove_own(&self) -> Result<()> {
        remove_heartbeat_file(&self.path_for(&self.member_id))
    }

    pub fn remove(&self, member_id: &str) -> Result<()> {
        remove_heartbeat_file(&self.path_for(member_id))
    }

    /// Run `beat` on a fixed cadence until `stop` is set. Intended to be
    /// run on a dedicated thread.
    pub fn run_loop(&self, generation: impl Fn() -> u64, stop: &AtomicBool) {
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.beat(generation()) {
                warn!(member_id = %self.member_id, error = %e, "heartbeat write failed");
            }
            std::thread::sleep(self.interval);
        }
    }

    /// Members whose last heartbeat is older than `session_timeout`,
    /// relative to `now`.
    pub fn check_peers(&self, now: SystemTime) -> Result<HashSet<String>> {
        let now_millis = now
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let timeout_millis = self.session_timeout.as_millis() as u64;

        let mut expired = HashSet::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(expired),
            Err(e) => return Err(Error::storage_unavailable(&self.dir, e)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage_unavailable(&self.dir, e))?;
            let path = entry.path();
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::storage_unavailable(&path, e)),
            };
            let record: HeartbeatRecord = match serde_json::from_slice(&bytes) {
                Ok(r) => r,
                Err(_) => continue, // torn read of a file mid-rewrite; try again next tick
            };
            let age = now_millis.saturating_sub(record.timestamp_millis);
            if age > timeout_millis {
                expired.insert(record.member_id);
            }
        }
        Ok(expired)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn remove_heartbeat_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::storage_unavailable(path, e)),
    }
}
