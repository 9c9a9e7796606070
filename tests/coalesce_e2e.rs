use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use config_monitor::{
    ApplyError, ConfigMonitor, FnHandler, JsonHandler, MonitorConfig, MonitorEventKind,
    TypedHandler,
};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct ModeConfig {
    mode: i32,
    param: i32,
}

/// Applies only when the mode changes or the param moves by more than 5.
/// Each apply blocks until the test releases it.
struct ModeHandler {
    started: Sender<ModeConfig>,
    release: Receiver<()>,
}

impl TypedHandler<ModeConfig> for ModeHandler {
    fn filter(&mut self, candidate: &ModeConfig, previous: Option<&ModeConfig>) -> bool {
        match previous {
            None => true,
            Some(prev) => prev.mode != candidate.mode || (candidate.param - prev.param).abs() > 5,
        }
    }

    fn apply(&mut self, config: &ModeConfig) -> Result<(), ApplyError> {
        let _ = self.started.send(*config);
        self.release
            .recv_timeout(WAIT)
            .map_err(|_| ApplyError::new("release timed out"))
    }
}

#[test]
fn updates_during_slow_apply_coalesce_to_latest() {
    let (started_tx, started_rx) = unbounded::<ModeConfig>();
    let (release_tx, release_rx) = unbounded::<()>();
    let handle = ConfigMonitor::spawn(
        JsonHandler::new(ModeHandler {
            started: started_tx,
            release: release_rx,
        }),
        MonitorConfig::default(),
    )
    .unwrap();
    let events = handle.subscribe();

    let first = ModeConfig { mode: 1, param: 1 };
    handle.update_json(&first).unwrap();
    assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), first);

    // Worker is inside apply(first): both of these land in the single slot.
    handle.update_json(&ModeConfig { mode: 2, param: 10 }).unwrap();
    let last = ModeConfig { mode: 3, param: 20 };
    handle.update_json(&last).unwrap();

    release_tx.send(()).unwrap();
    assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), last);
    release_tx.send(()).unwrap();

    let applied = events
        .wait_for(WAIT, |e| e.kind == MonitorEventKind::Applied && e.version == 3)
        .unwrap();
    assert_eq!(applied.version, 3);

    let current: ModeConfig = serde_json::from_slice(handle.current().unwrap().as_bytes()).unwrap();
    assert_eq!(current, last);

    let stats = handle.stats();
    assert_eq!(stats.accepted, 3);
    assert_eq!(stats.superseded, 1);
    assert_eq!(stats.applied, 2);
    assert_eq!(stats.skipped, 0);
    assert!(started_rx.try_recv().is_err());

    handle.shutdown_and_join().unwrap();
}

#[test]
fn mode_scenario_with_sleeps_converges() {
    let (started_tx, started_rx) = unbounded::<ModeConfig>();
    let (release_tx, release_rx) = unbounded::<()>();
    let handle = ConfigMonitor::spawn(
        JsonHandler::new(ModeHandler {
            started: started_tx,
            release: release_rx,
        }),
        MonitorConfig::default(),
    )
    .unwrap();

    // Release each apply after a short delay, like a slow backend.
    let releaser = thread::spawn(move || {
        while release_tx.send(()).is_ok() {
            thread::sleep(Duration::from_millis(40));
        }
    });

    let submitted = [
        ModeConfig { mode: 1, param: 1 },
        ModeConfig { mode: 2, param: 10 },
        ModeConfig { mode: 3, param: 20 },
    ];
    for cfg in &submitted {
        handle.update_json(cfg).unwrap();
        thread::sleep(Duration::from_millis(20));
    }

    let deadline = Instant::now() + WAIT;
    let mut applied = Vec::new();
    while applied.last() != Some(&submitted[2]) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        applied.push(started_rx.recv_timeout(remaining).unwrap());
    }

    // First always applies; the middle one may or may not have been coalesced away.
    assert_eq!(applied[0], submitted[0]);
    assert!(applied == submitted[..] || applied == [submitted[0], submitted[2]]);
    assert_eq!(handle.stats().skipped, 0);

    handle.shutdown_and_join().unwrap();
    releaser.join().unwrap();
}

#[test]
fn filtered_update_keeps_current_and_later_update_applies() {
    let (started_tx, started_rx) = unbounded::<ModeConfig>();
    let (release_tx, release_rx) = unbounded::<()>();
    for _ in 0..8 {
        release_tx.send(()).unwrap();
    }
    let handle = ConfigMonitor::spawn(
        JsonHandler::new(ModeHandler {
            started: started_tx,
            release: release_rx,
        }),
        MonitorConfig::default(),
    )
    .unwrap();
    let events = handle.subscribe();

    let base = ModeConfig { mode: 1, param: 1 };
    handle.update_json(&base).unwrap();
    assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), base);
    events
        .wait_for(WAIT, |e| e.kind == MonitorEventKind::Applied)
        .unwrap();

    // Same mode, param within 5: filtered.
    handle.update_json(&ModeConfig { mode: 1, param: 4 }).unwrap();
    let skipped = events
        .wait_for(WAIT, |e| e.kind == MonitorEventKind::Skipped)
        .unwrap();
    assert_eq!(skipped.version, 2);
    assert!(started_rx.try_recv().is_err());
    let current: ModeConfig = serde_json::from_slice(handle.current().unwrap().as_bytes()).unwrap();
    assert_eq!(current, base);

    let next = ModeConfig { mode: 1, param: 7 };
    handle.update_json(&next).unwrap();
    assert_eq!(started_rx.recv_timeout(WAIT).unwrap(), next);
    events
        .wait_for(WAIT, |e| e.kind == MonitorEventKind::Applied && e.version == 3)
        .unwrap();
    assert_eq!(handle.current().unwrap().version(), 3);

    handle.shutdown_and_join().unwrap();
}

#[test]
fn many_producers_converge_to_last_submitted() {
    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 200;

    let (applied_tx, applied_rx) = unbounded::<Vec<u8>>();
    let handle = ConfigMonitor::spawn(
        FnHandler::new(move |cfg: &[u8]| {
            thread::sleep(Duration::from_millis(1));
            let _ = applied_tx.send(cfg.to_vec());
        }),
        MonitorConfig::default(),
    )
    .unwrap();

    let mut producers = Vec::new();
    for p in 0..PRODUCERS {
        let monitor = handle.monitor().clone();
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                monitor.update(format!("p{p}-{i}").as_bytes()).unwrap();
            }
        }));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    let last = b"final".to_vec();
    let last_version = handle.update(&last).unwrap();
    assert_eq!(last_version, PRODUCERS * PER_PRODUCER + 1);

    let deadline = Instant::now() + WAIT;
    let mut seen = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let cfg = applied_rx.recv_timeout(remaining).unwrap();
        let done = cfg == last;
        seen.push(cfg);
        if done {
            break;
        }
    }

    // Joining guarantees the worker finished promoting the final payload.
    let monitor = handle.monitor().clone();
    handle.shutdown_and_join().unwrap();

    // Only submitted payloads are ever applied.
    let mut submitted: HashSet<Vec<u8>> = (0..PRODUCERS)
        .flat_map(|p| (0..PER_PRODUCER).map(move |i| format!("p{p}-{i}").into_bytes()))
        .collect();
    submitted.insert(last.clone());
    for cfg in &seen {
        assert!(
            submitted.contains(cfg),
            "unexpected payload {}",
            String::from_utf8_lossy(cfg)
        );
    }
    assert!(seen.len() <= (PRODUCERS * PER_PRODUCER + 1) as usize);
    assert_eq!(monitor.current().unwrap().as_bytes(), last.as_slice());

    let stats = monitor.stats();
    assert_eq!(stats.accepted, u64::from(PRODUCERS * PER_PRODUCER + 1));
    assert_eq!(stats.applied + stats.superseded, stats.accepted);
}

#[test]
fn update_latency_is_isolated_from_slow_apply() {
    let (entered_tx, entered_rx) = bounded::<()>(1);
    let in_apply = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&in_apply);
    let handle = ConfigMonitor::spawn(
        FnHandler::new(move |_: &[u8]| {
            flag.store(true, Ordering::SeqCst);
            let _ = entered_tx.try_send(());
            thread::sleep(Duration::from_millis(500));
            flag.store(false, Ordering::SeqCst);
        }),
        MonitorConfig::default(),
    )
    .unwrap();

    handle.update(b"slow").unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();

    let payload = vec![7u8; 4 * 1024];
    let started = Instant::now();
    for _ in 0..100 {
        handle.update(&payload).unwrap();
    }
    let elapsed = started.elapsed();

    assert!(in_apply.load(Ordering::SeqCst), "apply finished before producers were measured");
    assert!(elapsed < Duration::from_millis(250), "updates took {elapsed:?} during apply");

    handle.shutdown_and_join().unwrap();
}

#[test]
fn dropping_handle_joins_worker() {
    let (entered_tx, entered_rx) = bounded::<()>(1);
    let (done_tx, done_rx) = bounded::<()>(1);
    let handle = ConfigMonitor::spawn(
        FnHandler::new(move |_: &[u8]| {
            let _ = entered_tx.try_send(());
            thread::sleep(Duration::from_millis(50));
            let _ = done_tx.try_send(());
        }),
        MonitorConfig::default(),
    )
    .unwrap();

    handle.update(b"x").unwrap();
    entered_rx.recv_timeout(WAIT).unwrap();
    drop(handle);

    // The apply in progress at drop time has completed once drop returns.
    assert!(done_rx.try_recv().is_ok());
}

#[test]
fn accepted_event_precedes_applied() {
    for _ in 0..200 {
        let handle =
            ConfigMonitor::spawn(FnHandler::new(|_: &[u8]| {}), MonitorConfig::default())
                .unwrap();
        let events = handle.subscribe();
        let version = handle.update(b"x").unwrap();

        let first = events
            .wait_for(WAIT, |e| {
                matches!(e.kind, MonitorEventKind::Accepted | MonitorEventKind::Applied)
            })
            .unwrap();
        assert_eq!(first.kind, MonitorEventKind::Accepted);
        assert_eq!(first.version, version);

        let applied = events
            .wait_for(WAIT, |e| e.kind == MonitorEventKind::Applied)
            .unwrap();
        assert_eq!(applied.version, version);

        handle.shutdown_and_join().unwrap();
    }
}
