//! Tests for the control engine

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use brick_core::prelude::*;
use brick_device::test_utils::RecordingBrick;

use super::*;
use crate::config::{load_settings, CONFIG_DIR, CONFIG_FILENAME};
use crate::controller::{ChannelController, ControllerHandle};
use crate::engine_event::TaskKind;

// ─────────────────────────────────────────────────────────
// Test Hooks
// ─────────────────────────────────────────────────────────

/// Forwards every input as a command and records the results
#[derive(Debug, Default)]
struct Relay {
    pending: VecDeque<u32>,
    inputs: Vec<u32>,
    applied: Vec<(u32, u32)>,
    polls: usize,
    fail_on: Option<u32>,
    panic_on: Option<u32>,
}

impl EngineHooks for Relay {
    type Input = u32;
    type Command = u32;
    type Outcome = u32;

    fn process(&mut self, event: u32) -> Result<()> {
        if self.fail_on == Some(event) {
            return Err(Error::hook(format!("refusing input {}", event)));
        }
        if self.panic_on == Some(event) {
            panic!("input {} is out of range", event);
        }
        self.inputs.push(event);
        self.pending.push_back(event);
        Ok(())
    }

    fn next_command(&mut self) -> Result<Option<u32>> {
        self.polls += 1;
        Ok(self.pending.pop_front())
    }

    fn update(&mut self, outcome: u32, sent: u32) -> Result<()> {
        self.applied.push((sent, outcome));
        Ok(())
    }
}

type RelayEngine = ControlEngine<Relay, RecordingBrick<u32, u32>, ChannelController<u32>>;

/// Brick answering with ten times the command
fn times_ten() -> RecordingBrick<u32, u32> {
    RecordingBrick::new(|cmd: &u32| Ok(cmd * 10))
}

fn relay_engine(
    hooks: Relay,
    brick: RecordingBrick<u32, u32>,
    names: &[&str],
) -> (RelayEngine, Vec<ControllerHandle<u32>>) {
    let mut controllers = Vec::new();
    let mut handles = Vec::new();
    for name in names {
        let (controller, handle) = ChannelController::new(*name, 16);
        controllers.push(controller);
        handles.push(handle);
    }
    (ControlEngine::new(hooks, controllers, brick), handles)
}

/// Controller whose wait never completes
struct StuckController;

impl Controller for StuckController {
    type Event = u32;

    fn name(&self) -> &str {
        "stuck"
    }

    async fn wait_for_next_input(&mut self) -> Result<u32> {
        std::future::pending().await
    }
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

async fn wait_for_state<H, B, C>(
    engine: &ControlEngine<H, B, C>,
    what: &str,
    mut pred: impl FnMut(&H) -> bool,
) where
    H: EngineHooks,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if engine.with_state(|hooks| pred(hooks)).unwrap() {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for_tasks<H, B, C>(engine: &ControlEngine<H, B, C>, expected: usize)
where
    H: EngineHooks,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while engine.running_tasks() != expected {
        assert!(
            Instant::now() < deadline,
            "expected {} running tasks, found {}",
            expected,
            engine.running_tasks()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn next_event_matching(
    rx: &mut broadcast::Receiver<EngineEvent>,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ─────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_inputs_become_commands_and_results_are_applied() {
    let brick = times_ten();
    let calls = brick.calls();
    let (mut engine, handles) = relay_engine(Relay::default(), brick, &["pad"]);

    engine.start().unwrap();
    assert_eq!(engine.phase(), EnginePhase::Running);

    for value in [1, 2, 3] {
        handles[0].send(value).await.unwrap();
    }

    wait_for_state(&engine, "three results", |relay| relay.applied.len() == 3).await;
    engine.stop().await;

    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
    engine
        .with_state(|relay| {
            assert_eq!(relay.applied, vec![(1, 10), (2, 20), (3, 30)]);
        })
        .unwrap();
    assert_eq!(engine.completed_commands(), 3);
}

#[tokio::test]
async fn test_start_twice_fails() {
    let (mut engine, _handles) = relay_engine(Relay::default(), times_ten(), &["pad"]);

    engine.start().unwrap();
    let err = engine.start().unwrap_err();
    assert!(matches!(err, Error::Engine { .. }));

    engine.stop().await;
}

#[tokio::test]
async fn test_stop_when_stopped_is_noop() {
    let (mut engine, _handles) = relay_engine(Relay::default(), times_ten(), &["pad"]);
    engine.stop().await;
    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert_eq!(engine.running_tasks(), 0);
}

#[tokio::test]
async fn test_engine_can_be_restarted() {
    let brick = times_ten();
    let calls = brick.calls();
    let (mut engine, handles) = relay_engine(Relay::default(), brick, &["pad"]);

    engine.start().unwrap();
    handles[0].send(1).await.unwrap();
    wait_for_state(&engine, "first result", |relay| relay.applied.len() == 1).await;
    engine.stop().await;
    assert_eq!(engine.controller_count(), 1);

    engine.start().unwrap();
    handles[0].send(2).await.unwrap();
    wait_for_state(&engine, "second result", |relay| relay.applied.len() == 2).await;
    engine.stop().await;

    assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn test_lifecycle_events() {
    let (mut engine, _handles) = relay_engine(Relay::default(), times_ten(), &["a", "b"]);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    engine.stop().await;

    let events = drain_events(&mut rx);
    assert_eq!(events.first(), Some(&EngineEvent::Started { listeners: 2 }));
    assert_eq!(events.last(), Some(&EngineEvent::Stopped));
    assert!(!events.iter().any(EngineEvent::is_failure));
}

// ─────────────────────────────────────────────────────────
// Dispatch Behavior
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_no_command_means_no_device_call() {
    let brick = times_ten();
    let calls = brick.calls();
    let settings = EngineSettings {
        idle_interval_ms: 5,
        ..EngineSettings::default()
    };
    let (controller, _handle) = ChannelController::new("pad", 4);
    let mut engine =
        ControlEngine::with_settings(Relay::default(), [controller], brick, settings);

    engine.start().unwrap();
    wait_for_state(&engine, "repeated polling", |relay| relay.polls >= 3).await;
    engine.stop().await;

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(engine.completed_commands(), 0);
}

#[tokio::test]
async fn test_input_wakes_idle_dispatcher() {
    // An idle interval far beyond the test deadline: only the wake-up can
    // get the command out in time
    let settings = EngineSettings {
        idle_interval_ms: 60_000,
        ..EngineSettings::default()
    };
    let (controller, handle) = ChannelController::new("pad", 4);
    let mut engine =
        ControlEngine::with_settings(Relay::default(), [controller], times_ten(), settings);

    engine.start().unwrap();
    wait_for_state(&engine, "dispatcher to go idle", |relay| relay.polls >= 1).await;

    handle.send(4).await.unwrap();
    wait_for_state(&engine, "woken dispatch", |relay| {
        relay.applied == vec![(4, 40)]
    })
    .await;

    engine.stop().await;
}

#[tokio::test]
async fn test_in_flight_command_completes_before_listeners_stop() {
    let brick = times_ten().with_latency(Duration::from_millis(100));
    let calls = brick.calls();
    let (mut engine, handles) = relay_engine(Relay::default(), brick, &["pad"]);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    handles[0].send(7).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while calls.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "command never reached the brick");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    engine.stop().await;

    engine
        .with_state(|relay| assert_eq!(relay.applied, vec![(7, 70)]))
        .unwrap();

    let finished: Vec<TaskKind> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::TaskFinished { kind, .. } => Some(kind),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![TaskKind::Dispatch, TaskKind::Listener]);
}

// ─────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stop_unblocks_pending_controller_wait() {
    let mut engine = ControlEngine::new(
        Relay::default(),
        [StuckController, StuckController],
        times_ten(),
    );

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.running_tasks(), 3);

    tokio::time::timeout(Duration::from_secs(2), engine.stop())
        .await
        .expect("stop must not hang on a blocked controller");

    assert_eq!(engine.running_tasks(), 0);
    assert_eq!(engine.controller_count(), 2);
}

#[tokio::test]
async fn test_closed_controller_ends_listener_quietly() {
    let (mut engine, mut handles) = relay_engine(Relay::default(), times_ten(), &["pad"]);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    handles.clear();

    let event = next_event_matching(&mut rx, |e| {
        matches!(e, EngineEvent::TaskFinished { kind: TaskKind::Listener, .. })
    })
    .await;
    assert_eq!(
        event,
        EngineEvent::TaskFinished {
            task: "pad#0".to_string(),
            kind: TaskKind::Listener,
        }
    );

    engine.stop().await;
    assert!(!drain_events(&mut rx).iter().any(EngineEvent::is_failure));
}

// ─────────────────────────────────────────────────────────
// Failure Handling
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hook_failure_stops_only_that_listener() {
    let hooks = Relay {
        fail_on: Some(13),
        ..Relay::default()
    };
    let (mut engine, handles) = relay_engine(hooks, times_ten(), &["left", "right"]);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    handles[0].send(13).await.unwrap();

    let failed = next_event_matching(&mut rx, EngineEvent::is_failure).await;
    match failed {
        EngineEvent::TaskFailed { task, kind, error } => {
            assert_eq!(task, "left#0");
            assert_eq!(kind, TaskKind::Listener);
            assert!(error.contains("refusing input 13"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    handles[1].send(5).await.unwrap();
    wait_for_state(&engine, "surviving listener", |relay| {
        relay.applied == vec![(5, 50)]
    })
    .await;
    wait_for_tasks(&engine, 2).await;

    engine.stop().await;
    assert_eq!(engine.running_tasks(), 0);
}

#[tokio::test]
async fn test_panicking_hook_stops_only_that_listener() {
    let hooks = Relay {
        panic_on: Some(13),
        ..Relay::default()
    };
    let (mut engine, handles) = relay_engine(hooks, times_ten(), &["left", "right"]);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    handles[0].send(13).await.unwrap();

    let failed = next_event_matching(&mut rx, EngineEvent::is_failure).await;
    match failed {
        EngineEvent::TaskFailed { task, kind, error } => {
            assert_eq!(task, "left#0");
            assert_eq!(kind, TaskKind::Listener);
            assert!(error.contains("input 13 is out of range"), "{}", error);
        }
        other => panic!("unexpected event {:?}", other),
    }

    handles[1].send(5).await.unwrap();
    wait_for_state(&engine, "surviving listener", |relay| {
        relay.applied == vec![(5, 50)]
    })
    .await;
    wait_for_tasks(&engine, 2).await;

    engine.stop().await;
    let failures: Vec<EngineEvent> = drain_events(&mut rx)
        .into_iter()
        .filter(EngineEvent::is_failure)
        .collect();
    assert!(failures.is_empty(), "unexpected failures {:?}", failures);

    // Both controllers come back and the engine runs again
    assert_eq!(engine.controller_count(), 2);
    engine.start().unwrap();
    handles[0].send(6).await.unwrap();
    wait_for_state(&engine, "restarted listener", |relay| {
        relay.applied == vec![(5, 50), (6, 60)]
    })
    .await;
    engine.stop().await;
}

#[tokio::test]
async fn test_start_refuses_poisoned_state() {
    let (mut engine, _handles) = relay_engine(Relay::default(), times_ten(), &["pad"]);

    let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        engine.with_state(|_| panic!("reader blew up")).ok();
    }));
    assert!(caught.is_err());

    let err = engine.start().unwrap_err();
    assert!(matches!(err, Error::Engine { .. }));
    assert_eq!(engine.phase(), EnginePhase::Stopped);
    assert_eq!(engine.controller_count(), 1);
}

#[tokio::test]
async fn test_device_error_stops_dispatch_but_not_listeners() {
    let brick: RecordingBrick<u32, u32> =
        RecordingBrick::new(|_| Err(Error::transport("cable unplugged")));
    let (mut engine, handles) = relay_engine(Relay::default(), brick, &["pad"]);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    handles[0].send(1).await.unwrap();

    let failed = next_event_matching(&mut rx, EngineEvent::is_failure).await;
    assert!(matches!(
        failed,
        EngineEvent::TaskFailed {
            kind: TaskKind::Dispatch,
            ..
        }
    ));

    handles[0].send(2).await.unwrap();
    wait_for_state(&engine, "listener still applying input", |relay| {
        relay.inputs == vec![1, 2]
    })
    .await;
    wait_for_tasks(&engine, 1).await;

    tokio::time::timeout(Duration::from_secs(2), engine.stop())
        .await
        .expect("stop after dispatch failure");

    engine
        .with_state(|relay| assert!(relay.applied.is_empty()))
        .unwrap();
}

#[tokio::test]
async fn test_slow_device_times_out() {
    let settings = EngineSettings {
        command_timeout_ms: 30,
        ..EngineSettings::default()
    };
    let brick = times_ten().with_latency(Duration::from_secs(10));
    let (controller, handle) = ChannelController::new("pad", 4);
    let mut engine =
        ControlEngine::with_settings(Relay::default(), [controller], brick, settings);
    let mut rx = engine.subscribe();

    engine.start().unwrap();
    handle.send(1).await.unwrap();

    let failed = next_event_matching(&mut rx, EngineEvent::is_failure).await;
    match failed {
        EngineEvent::TaskFailed { kind, error, .. } => {
            assert_eq!(kind, TaskKind::Dispatch);
            assert!(error.contains("did not answer"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    engine.stop().await;
}

// ─────────────────────────────────────────────────────────
// Mutual Exclusion
// ─────────────────────────────────────────────────────────

/// Flags any hook call that starts while another is still running
#[derive(Debug)]
struct Guarded {
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    inputs: u64,
    pending: u64,
    issued: u64,
    applied: u64,
    first: u64,
    second: u64,
}

impl Guarded {
    fn new(busy: Arc<AtomicBool>, overlaps: Arc<AtomicUsize>) -> Self {
        Self {
            busy,
            overlaps,
            inputs: 0,
            pending: 0,
            issued: 0,
            applied: 0,
            first: 0,
            second: 0,
        }
    }

    /// Enter a hook, do a non-atomic two-step write, leave
    fn critical_section(&mut self) {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if self.first != self.second {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.first += 1;
        for _ in 0..200 {
            std::hint::spin_loop();
        }
        self.second += 1;
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl EngineHooks for Guarded {
    type Input = u64;
    type Command = u64;
    type Outcome = u64;

    fn process(&mut self, _event: u64) -> Result<()> {
        self.critical_section();
        self.inputs += 1;
        self.pending += 1;
        Ok(())
    }

    fn next_command(&mut self) -> Result<Option<u64>> {
        self.critical_section();
        if self.pending == 0 {
            return Ok(None);
        }
        self.pending -= 1;
        self.issued += 1;
        Ok(Some(self.issued))
    }

    fn update(&mut self, _outcome: u64, _sent: u64) -> Result<()> {
        self.critical_section();
        self.applied += 1;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hooks_never_run_concurrently() {
    const CONTROLLERS: usize = 4;
    const EVENTS_PER_CONTROLLER: u64 = 250;
    const TOTAL: u64 = CONTROLLERS as u64 * EVENTS_PER_CONTROLLER;

    let busy = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let mut controllers = Vec::new();
    let mut producers = Vec::new();
    for i in 0..CONTROLLERS {
        let (controller, handle) = ChannelController::new(format!("stress-{}", i), 8);
        controllers.push(controller);
        producers.push(tokio::spawn(async move {
            for n in 0..EVENTS_PER_CONTROLLER {
                handle.send(n).await.unwrap();
            }
        }));
    }

    let brick: RecordingBrick<u64, u64> = RecordingBrick::new(|cmd: &u64| Ok(*cmd));
    let mut engine = ControlEngine::new(
        Guarded::new(Arc::clone(&busy), Arc::clone(&overlaps)),
        controllers,
        brick,
    );

    engine.start().unwrap();
    for producer in producers {
        producer.await.unwrap();
    }
    wait_for_state(&engine, "all commands applied", |g| {
        g.inputs == TOTAL && g.pending == 0 && g.applied == g.issued
    })
    .await;
    engine.stop().await;

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    engine
        .with_state(|g| {
            assert_eq!(g.issued, TOTAL);
            assert_eq!(g.first, g.second);
        })
        .unwrap();
}

// ─────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_engine_honours_project_config_file() {
    let temp = tempfile::tempdir().unwrap();
    let config_dir = temp.path().join(CONFIG_DIR);
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join(CONFIG_FILENAME),
        "[engine]\nidle_interval_ms = 7\ncommand_timeout_ms = 40\n",
    )
    .unwrap();

    let settings = load_settings(temp.path());
    let brick = times_ten().with_latency(Duration::from_secs(10));
    let (controller, handle) = ChannelController::new("pad", 4);
    let mut engine = ControlEngine::from_settings(Relay::default(), [controller], brick, &settings);

    assert_eq!(engine.settings().idle_interval_ms, 7);
    assert_eq!(engine.settings().command_timeout(), Duration::from_millis(40));
    assert_eq!(engine.settings().event_capacity, 64);

    let mut rx = engine.subscribe();
    engine.start().unwrap();
    handle.send(1).await.unwrap();

    let failed = next_event_matching(&mut rx, EngineEvent::is_failure).await;
    match failed {
        EngineEvent::TaskFailed { kind, error, .. } => {
            assert_eq!(kind, TaskKind::Dispatch);
            assert!(error.contains("did not answer within 40ms"), "{}", error);
        }
        other => panic!("unexpected event {:?}", other),
    }

    engine.stop().await;
}
