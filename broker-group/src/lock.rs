// A single exclusive advisory file lock per group. The kernel releases it
// automatically when the holding file descriptor closes or the process
// dies, which is exactly the guarantee spec.md requires and application
// code gets for free by scoping the guard's lifetime to the transaction.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use broker_base::{Error, Result};

pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Block until the exclusive lock at `path` is acquired, or return
/// `LockContention` once `timeout` has elapsed. There is only one lock in
/// the system, so no deadlock is possible; the bound exists purely to turn
/// a stuck peer into a retryable error instead of an indefinite hang.
pub fn acquire(path: &Path, timeout: Duration) -> Result<LockGuard> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::storage_unavailable(parent, e))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|e| Error::storage_unavailable(path, e))?;

    let deadline = Instant::now() + timeout;
    loop {
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                return Ok(LockGuard {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(Error::lock_contention(path));
                }
                thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(Error::storage_unavailable(path, e)),
        }
    }
}
