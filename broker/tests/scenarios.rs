// End-to-end scenarios from the concrete worked examples: real threads
// standing in for separate processes, all driven through the public
// `Broker` facade so these tests exercise exactly what an embedder would.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use broker::{AssignorKind, Broker, BrokerConfig, Record};

fn fast_config(root: impl Into<std::path::PathBuf>, partitions: u32) -> BrokerConfig {
    let mut cfg = BrokerConfig::new(root, partitions);
    cfg.assignor = AssignorKind::RoundRobin;
    cfg.heartbeat_interval = Duration::from_millis(30);
    cfg.session_timeout = Duration::from_millis(150);
    cfg.idle_poll_interval = Duration::from_millis(10);
    cfg
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test_log::test]
fn single_producer_single_consumer_observes_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::open(fast_config(dir.path(), 4)).unwrap();

    for (key, payload) in [("a", "p1"), ("b", "p2"), ("a", "p3"), ("c", "p4")] {
        broker.produce(key.as_bytes(), payload.as_bytes()).unwrap();
    }

    let received = Arc::new(Mutex::new(Vec::<Record>::new()));
    let sink = Arc::clone(&received);
    let handler: broker::Handler = Arc::new(move |record: Record| {
        sink.lock().unwrap().push(record);
        Ok(())
    });

    let member = broker.subscribe("group-1", "solo", handler).unwrap();
    let got_all = wait_until(
        || received.lock().unwrap().len() == 4,
        Duration::from_secs(5),
    );
    assert!(got_all, "consumer never observed all four records");

    let payloads: BTreeSet<String> = received
        .lock()
        .unwrap()
        .iter()
        .map(|r| String::from_utf8_lossy(&r.payload).to_string())
        .collect();
    assert_eq!(
        payloads,
        ["p1", "p2", "p3", "p4"].into_iter().map(String::from).collect()
    );

    member.shutdown().unwrap();
}

#[test_log::test]
fn join_triggers_rebalance_and_splits_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::open(fast_config(dir.path(), 4)).unwrap();

    let noop: broker::Handler = Arc::new(|_record: Record| Ok(()));
    let a = broker.subscribe("group-2", "A", Arc::clone(&noop)).unwrap();

    let settled_alone = wait_until(
        || a.current_assignment().1.len() == 4,
        Duration::from_secs(2),
    );
    assert!(settled_alone, "sole member A never owned all partitions");

    let b = broker.subscribe("group-2", "B", noop).unwrap();

    let rebalanced = wait_until(
        || a.current_assignment().1.len() == 2 && b.current_assignment().1.len() == 2,
        Duration::from_secs(2),
    );
    assert!(rebalanced, "rebalance after B joined never settled");

    let (gen_a, parts_a) = a.current_assignment();
    let (gen_b, parts_b) = b.current_assignment();
    assert_eq!(gen_a, gen_b, "both members must converge on the same generation");

    let mut union: Vec<u32> = parts_a.iter().chain(parts_b.iter()).copied().collect();
    union.sort();
    assert_eq!(union, vec![0, 1, 2, 3], "partitions must be fully covered and disjoint");

    a.shutdown().unwrap();
    b.shutdown().unwrap();
}

#[test_log::test]
fn watermark_crash_recovery_hides_stray_future_record() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    {
        let broker = Broker::open(fast_config(&root, 1)).unwrap();
        let (p, o) = broker.produce(b"k", b"v1").unwrap();
        assert_eq!((p, o), (0, 1));
    }

    // Simulate a torn crash: a record file for offset 2 made it to disk,
    // but the watermark was never advanced past 1.
    let partition_dir = broker_base::partition_dir(&root, 0);
    std::fs::write(
        partition_dir.join(format!("{}.msg", broker_base::pad20(2))),
        b"\x05\x00\x00\x00garbage-that-is-not-really-a-frame",
    )
    .unwrap();

    let broker = Broker::open(fast_config(&root, 1)).unwrap();
    assert_eq!(broker.high_watermarks(), vec![1]);

    let (p, o) = broker.produce(b"k2", b"v2").unwrap();
    assert_eq!((p, o), (0, 2));

    let received = Arc::new(Mutex::new(Vec::<Record>::new()));
    let sink = Arc::clone(&received);
    let handler: broker::Handler = Arc::new(move |record: Record| {
        sink.lock().unwrap().push(record);
        Ok(())
    });
    let member = broker.subscribe("group-3", "solo", handler).unwrap();

    let got_both = wait_until(|| received.lock().unwrap().len() == 2, Duration::from_secs(5));
    assert!(got_both);

    let second = received.lock().unwrap()[1].clone();
    assert_eq!(second.offset, 2);
    assert_eq!(second.payload, b"v2", "the overwritten record, not the stray garbage, must be delivered");

    member.shutdown().unwrap();
}

#[test_log::test]
fn zero_members_status_is_generation_zero_and_empty() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::open(fast_config(dir.path(), 4)).unwrap();
    let (generation, assignment) = broker.group_status("untouched-group").unwrap();
    assert_eq!(generation, 0);
    assert!(assignment.is_empty());
}
