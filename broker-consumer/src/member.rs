// Glues the consumer side together: join, spawn readers for the owned
// partitions, run a heartbeat thread, and run one lightweight supervisor
// thread that polls the coordinator for rebalance and peer expiry so the
// readers themselves never touch the group lock.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use tracing::{info, warn};

use broker_base::{AssignorKind, Result};
use broker_group::{GroupCoordinator, HeartbeatMonitor, MemberMetadata};
use broker_log::{OffsetStore, PartitionedLog};

use crate::reader::{self, Handler};

type ReaderHandle = JoinHandle<Result<()>>;

fn join_reader(partition: u32, handle: ReaderHandle) {
    match handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => info!(partition, error = %e, "reader exited"),
        Err(_) => warn!(partition, "reader thread panicked"),
    }
}

pub(crate) struct MemberState {
    pub generation: u64,
    pub partitions: BTreeSet<u32>,
}

pub struct ConsumerGroupMember {
    member_id: String,
    heartbeats_dir: PathBuf,
    coordinator: Arc<GroupCoordinator>,
    shared: Arc<RwLock<MemberState>>,
    stop: Arc<AtomicBool>,
    supervisor: Option<JoinHandle<()>>,
    heartbeat_thread: Option<JoinHandle<()>>,
}

impl ConsumerGroupMember {
    /// Joins `group`, spawns readers for the partitions the coordinator
    /// assigns, and starts heartbeating. `handler` is invoked synchronously
    /// on whichever reader thread owns the record's partition.
    #[allow(clippy::too_many_arguments)]
    pub fn join(
        root: impl Into<PathBuf>,
        group: impl Into<String>,
        member_id: impl Into<String>,
        log: Arc<PartitionedLog>,
        partitions: u32,
        assignor: AssignorKind,
        heartbeat_interval: Duration,
        session_timeout: Duration,
        idle_poll_interval: Duration,
        lock_wait_timeout: Duration,
        handler: Handler,
    ) -> Result<Self> {
        let root = root.into();
        let group = group.into();
        let member_id = member_id.into();

        let coordinator = Arc::new(GroupCoordinator::open(
            &root,
            group.clone(),
            partitions,
            assignor,
            lock_wait_timeout,
        )?);
        let offsets = Arc::new(OffsetStore::open(&root, &group)?);
        let heartbeat = Arc::new(HeartbeatMonitor::new(
            &root,
            member_id.clone(),
            heartbeat_interval,
            session_timeout,
        )?);
        let heartbeats_dir = root.join(".coordinator").join("heartbeats");

        let metadata = MemberMetadata::here(std::process::id());
        let (generation, my_partitions) = coordinator.join(&member_id, &metadata)?;
        heartbeat.beat(generation)?;

        let shared = Arc::new(RwLock::new(MemberState {
            generation,
            partitions: my_partitions.iter().copied().collect(),
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let mut readers: HashMap<u32, ReaderHandle> = HashMap::new();
        for &p in &my_partitions {
            readers.insert(
                p,
                spawn_reader(
                    p,
                    generation,
                    &member_id,
                    &log,
                    &offsets,
                    &shared,
                    &handler,
                    idle_poll_interval,
                    &stop,
                ),
            );
        }

        let heartbeat_thread = {
            let heartbeat = Arc::clone(&heartbeat);
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            std::thread::Builder::new()
                .name(format!("heartbeat-{member_id}"))
                .spawn(move || {
                    let generation_of = || shared.read().map(|s| s.generation).unwrap_or(0);
                    heartbeat.run_loop(generation_of, &stop);
                })
                .expect("spawning heartbeat thread")
        };

        let supervisor = {
            let member_id = member_id.clone();
            let coordinator = Arc::clone(&coordinator);
            let heartbeat = Arc::clone(&heartbeat);
            let heartbeats_dir = heartbeats_dir.clone();
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            let log = Arc::clone(&log);
            let offsets = Arc::clone(&offsets);
            let handler = Arc::clone(&handler);
            std::thread::Builder::new()
                .name(format!("supervisor-{member_id}"))
                .spawn(move || {
                    supervise(
                        member_id,
                        coordinator,
                        heartbeat,
                        heartbeats_dir,
                        shared,
                        stop,
                        log,
                        offsets,
                        handler,
                        idle_poll_interval,
                        readers,
                    )
                })
                .expect("spawning supervisor thread")
        };

        Ok(ConsumerGroupMember {
            member_id,
            heartbeats_dir,
            coordinator,
            shared,
            stop,
            supervisor: Some(supervisor),
            heartbeat_thread: Some(heartbeat_thread),
        })
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Current generation and this member's owned partitions, as last
    /// observed by the supervisor — not a fresh read of the coordinator.
    pub fn current_assignment(&self) -> (u64, Vec<u32>) {
        let state = match self.shared.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        (state.generation, state.partitions.iter().copied().collect())
    }

    /// Signals all reader and supervisor threads to stop, joins them, then
    /// leaves the group and removes this member's heartbeat file.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.heartbeat_thread.take() {
            let _ = h.join();
        }
        if let Some(h) = self.supervisor.take() {
            let _ = h.join();
        }
        self.coordinator.leave(&self.member_id, &self.heartbeats_dir)?;
        info!(member_id = %self.member_id, "left group");
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_reader(
    partition: u32,
    generation: u64,
    member_id: &str,
    log: &Arc<PartitionedLog>,
    offsets: &Arc<OffsetStore>,
    shared: &Arc<RwLock<MemberState>>,
    handler: &Handler,
    idle_poll_interval: Duration,
    stop: &Arc<AtomicBool>,
) -> ReaderHandle {
    let member_id = member_id.to_string();
    let log = Arc::clone(log);
    let offsets = Arc::clone(offsets);
    let shared = Arc::clone(shared);
    let handler = Arc::clone(handler);
    let stop = Arc::clone(stop);
    std::thread::Builder::new()
        .name(format!("reader-{partition}"))
        .spawn(move || {
            reader::run(
                partition,
                generation,
                member_id,
                log,
                offsets,
                shared,
                handler,
                idle_poll_interval,
                stop,
            )
        })
        .expect("spawning reader thread")
}

#[allow(clippy::too_many_arguments)]
fn supervise(
    member_id: String,
    coordinator: Arc<GroupCoordinator>,
    heartbeat: Arc<HeartbeatMonitor>,
    heartbeats_dir: PathBuf,
    shared: Arc<RwLock<MemberState>>,
    stop: Arc<AtomicBool>,
    log: Arc<PartitionedLog>,
    offsets: Arc<OffsetStore>,
    handler: Handler,
    idle_poll_interval: Duration,
    mut readers: HashMap<u32, ReaderHandle>,
) {
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(idle_poll_interval);

        match heartbeat.check_peers(SystemTime::now()) {
            Ok(expired) if !expired.is_empty() => {
                if let Err(e) = coordinator.evict(&expired, &heartbeats_dir, &member_id) {
                    warn!(error = %e, "eviction attempt failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "peer heartbeat check failed"),
        }

        let (generation, assignment) = match coordinator.snapshot() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "snapshot failed");
                continue;
            }
        };
        let my_partitions: BTreeSet<u32> = assignment
            .get(&member_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        let changed = {
            let state = shared.read().unwrap_or_else(|p| p.into_inner());
            state.generation != generation || state.partitions != my_partitions
        };
        if !changed {
            readers.retain(|_, h| !h.is_finished());
            continue;
        }

        info!(member_id = %member_id, generation, partitions = ?my_partitions, "rebalance observed");
        {
            let mut state = shared.write().unwrap_or_else(|p| p.into_inner());
            state.generation = generation;
            state.partitions = my_partitions.clone();
        }

        // Readers for partitions we no longer own will exit on their own
        // fence check against the state just written above.
        let retired: Vec<u32> = readers
            .keys()
            .filter(|p| !my_partitions.contains(p))
            .copied()
            .collect();
        for p in retired {
            if let Some(h) = readers.remove(&p) {
                join_reader(p, h);
            }
        }

        for &p in &my_partitions {
            if readers.contains_key(&p) {
                continue;
            }
            readers.insert(
                p,
                spawn_reader(
                    p,
                    generation,
                    &member_id,
                    &log,
                    &offsets,
                    &shared,
                    &handler,
                    idle_poll_interval,
                    &stop,
                ),
            );
        }
    }

    for (p, h) in readers {
        join_reader(p, h);
    }
}
