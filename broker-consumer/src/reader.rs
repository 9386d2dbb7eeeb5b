// One thread per owned partition. The fence check reads only the shared,
// lock-free `MemberState` the supervisor maintains — never the coordinator's
// file lock — so a caught-up reader's hot path never blocks on anything but
// the filesystem read and the idle-poll sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard};
use std::time::Duration;

use tracing::{info, warn};

use broker_base::{Error, Result};
use broker_log::{OffsetStore, PartitionedLog, Record};

use crate::member::MemberState;

/// What a handler invocation returned, boxed so application code can use
/// whatever error type it likes.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Application callback: `(key, payload, partition, offset)`, delivered
/// synchronously on the owning partition's reader thread. Must be
/// idempotent — delivery is at least once. An `Err` return means "do not
/// commit"; the same record is redelivered on the next poll.
pub type Handler =
    Arc<dyn Fn(Record) -> std::result::Result<(), HandlerError> + Send + Sync + 'static>;

fn still_owned(state: &MemberState, partition: u32, my_generation: u64) -> bool {
    state.generation == my_generation && state.partitions.contains(&partition)
}

fn read_state(shared: &RwLock<MemberState>) -> RwLockReadGuard<'_, MemberState> {
    match shared.read() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Runs until fenced out (generation changed or partition reassigned),
/// told to stop, or a storage error leaves the reader unable to proceed.
/// `Ok(())` means the stop signal fired; `Err(RebalanceInProgress)` and
/// `Err(NotOwner { .. })` are the two fencing sentinels the supervisor
/// expects, not exceptional failures. Any return hands control back to the
/// supervisor, which decides whether to restart this partition under a new
/// generation.
pub fn run(
    partition: u32,
    my_generation: u64,
    member_id: String,
    log: Arc<PartitionedLog>,
    offsets: Arc<OffsetStore>,
    shared: Arc<RwLock<MemberState>>,
    handler: Handler,
    idle_poll_interval: Duration,
    stop: Arc<AtomicBool>,
) -> Result<()> {
    let mut cursor = offsets.load(partition)? + 1;

    loop {
        if stop.load(Ordering::Relaxed) {
            info!(partition, "reader stopping on shutdown signal");
            return Ok(());
        }
        if !still_owned(&read_state(&shared), partition, my_generation) {
            info!(partition, my_generation, "reader fenced out, exiting for rejoin");
            return Err(Error::RebalanceInProgress);
        }

        match log.read(partition, cursor) {
            Ok(Some((key, payload))) => {
                let outcome = handler(Record {
                    partition,
                    offset: cursor,
                    key,
                    payload,
                });

                if let Err(e) = outcome {
                    warn!(partition, offset = cursor, error = %e, "handler failed, not committing");
                    std::thread::sleep(idle_poll_interval);
                    continue;
                }

                let state = read_state(&shared);
                if !still_owned(&state, partition, my_generation) {
                    let generation = state.generation;
                    drop(state);
                    return Err(Error::not_owner(partition, generation));
                }
                drop(state);

                offsets.commit(partition, cursor, &member_id)?;
                cursor += 1;
            }
            Ok(None) => {
                std::thread::sleep(idle_poll_interval);
            }
            Err(e) => {
                warn!(partition, error = %e, "read failed, exiting reader");
                return Err(e);
            }
        }
    }
}
