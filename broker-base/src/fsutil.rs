// Shared filesystem primitives the rest of the workspace builds on: the
// zero-padded offset filename format (load-bearing for lexicographic
// ordering per the on-disk layout) and the atomic-rename-with-fsync
// discipline used by every durable write in this system (watermark,
// generation, assignment, offsets, heartbeats).

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub const PARTITION_DIR_PREFIX: &str = "partition-";

/// Zero-pad an offset to the 20-digit width fixed by the on-disk layout.
/// This width must not change: it is what makes directory listings sort
/// in offset order.
pub fn pad20(offset: u64) -> String {
    format!("{offset:020}")
}

/// Write `contents` to `path` atomically with respect to concurrent
/// readers: write to a uniquely-named sibling file, fsync its data, rename
/// it over `path`, then fsync the containing directory so the rename
/// itself is durable. `unique_suffix` should include something that won't
/// collide with a concurrent writer (a member id, a pid) so two writers
/// racing on the same canonical name don't clobber each other's temp file.
pub fn atomic_write(path: &Path, contents: &[u8], unique_suffix: &str) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{file_name}.tmp-{unique_suffix}"));

    write_and_sync(&tmp_path, contents).map_err(|e| Error::storage_unavailable(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| Error::storage_unavailable(path, e))?;
    sync_dir(dir).map_err(|e| Error::storage_unavailable(dir, e))?;
    Ok(())
}

fn write_and_sync(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut f = File::create(path)?;
    f.write_all(contents)?;
    f.sync_all()?;
    Ok(())
}

/// Force the directory entry for a newly created/renamed file to stable
/// storage. On platforms where opening a directory for reading isn't
/// meaningful (this is a best-effort durability step, not a correctness
/// requirement of the in-memory model).
fn sync_dir(dir: &Path) -> io::Result<()> {
    match File::open(dir) {
        Ok(d) => d.sync_all(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Read a whole file to a `String`, mapping "not found" to `None` so
/// callers can distinguish "absent" (fresh state) from I/O corruption.
pub fn read_to_string_opt(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn partition_dir(root: &Path, partition: u32) -> PathBuf {
    root.join(format!("{PARTITION_DIR_PREFIX}{partition}"))
}
