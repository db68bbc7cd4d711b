//! The listening and dispatch loops run by the control engine.
//!
//! Each loop owns its controller or brick for as long as it runs and hands
//! it back when it exits, so a stopped engine can be started again.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};

use brick_core::prelude::*;
use brick_device::Brick;

use crate::controller::Controller;
use crate::engine_event::{EngineEvent, TaskKind};
use crate::hooks::EngineHooks;

/// Task name used for the dispatch loop in logs and events
pub const DISPATCH_TASK_NAME: &str = "dispatcher";

/// State and signals shared by every task of one engine
pub(super) struct Shared<H> {
    pub state: Arc<Mutex<H>>,
    /// Woken after each processed input so an idle dispatcher re-checks
    pub wake: Arc<Notify>,
    pub events: broadcast::Sender<EngineEvent>,
    pub completed: Arc<AtomicU64>,
}

impl<H> Clone for Shared<H> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            wake: Arc::clone(&self.wake),
            events: self.events.clone(),
            completed: Arc::clone(&self.completed),
        }
    }
}

impl<H: EngineHooks> Shared<H> {
    /// Run one hook with exclusive access to the engine state.
    ///
    /// A panicking hook is caught while the guard is still held, so the lock
    /// is not poisoned and only the calling task sees the failure.
    pub fn with_hooks<R>(&self, f: impl FnOnce(&mut H) -> Result<R>) -> Result<R> {
        let mut hooks = self
            .state
            .lock()
            .map_err(|_| Error::hook("engine state lock poisoned by an earlier panic"))?;
        panic::catch_unwind(AssertUnwindSafe(|| f(&mut hooks))).map_err(|payload| {
            Error::hook(format!("hook panicked: {}", panic_message(&*payload)))
        })?
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Log how a task ended and announce it
    fn finish(&self, kind: TaskKind, task: &str, outcome: Result<()>) {
        match outcome {
            Ok(()) => info!("Stopping {} task {}", kind, task),
            Err(e) if e.is_cancellation() => {
                info!("Stopping {} task {}: {}", kind, task, e);
            }
            Err(e) => {
                error!("{} task {} failed, leaving its loop: {}", kind, task, e);
                self.emit(EngineEvent::TaskFailed {
                    task: task.to_string(),
                    kind,
                    error: e.to_string(),
                });
            }
        }
        self.emit(EngineEvent::TaskFinished {
            task: task.to_string(),
            kind,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Timing knobs for the dispatch loop
#[derive(Debug, Clone, Copy)]
pub(super) struct DispatchTiming {
    pub idle_interval: Duration,
    pub command_timeout: Duration,
}

/// Listening task: apply every event from `controller` until asked to stop.
pub(super) async fn listen<H, C>(
    task: String,
    mut controller: C,
    shared: Shared<H>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> C
where
    H: EngineHooks,
    C: Controller<Event = H::Input>,
{
    info!("Starting listener task {}", task);
    let outcome = run_listener(&mut controller, &shared, &mut shutdown_rx).await;
    shared.finish(TaskKind::Listener, &task, outcome);
    controller
}

/// Ends with [`Error::Cancelled`] once asked to stop
async fn run_listener<H, C>(
    controller: &mut C,
    shared: &Shared<H>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()>
where
    H: EngineHooks,
    C: Controller<Event = H::Input>,
{
    loop {
        if *shutdown_rx.borrow() {
            return Err(Error::Cancelled);
        }

        let event = tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return Err(Error::Cancelled);
                }
                continue;
            }
            input = controller.wait_for_next_input() => input?,
        };

        shared.with_hooks(|hooks| hooks.process(event))?;
        shared.wake.notify_one();
    }
}

/// Dispatch task: turn state into commands and results back into state.
pub(super) async fn dispatch<H, B>(
    mut brick: B,
    shared: Shared<H>,
    timing: DispatchTiming,
    mut shutdown_rx: watch::Receiver<bool>,
) -> B
where
    H: EngineHooks,
    B: Brick<Command = H::Command, Outcome = H::Outcome>,
{
    info!("Starting dispatch task");
    let outcome = run_dispatch(&mut brick, &shared, timing, &mut shutdown_rx).await;
    shared.finish(TaskKind::Dispatch, DISPATCH_TASK_NAME, outcome);
    brick
}

/// Ends with [`Error::Cancelled`] once asked to stop
async fn run_dispatch<H, B>(
    brick: &mut B,
    shared: &Shared<H>,
    timing: DispatchTiming,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<()>
where
    H: EngineHooks,
    B: Brick<Command = H::Command, Outcome = H::Outcome>,
{
    loop {
        if *shutdown_rx.borrow() {
            return Err(Error::Cancelled);
        }

        let Some(command) = shared.with_hooks(|hooks| hooks.next_command())? else {
            // Nothing to send: sleep until new input, the idle interval, or a stop request
            tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Err(Error::Cancelled);
                    }
                }
                _ = shared.wake.notified() => {}
                _ = tokio::time::sleep(timing.idle_interval) => {}
            }
            continue;
        };

        // The round trip runs outside the state lock
        let outcome = match tokio::time::timeout(timing.command_timeout, brick.process(&command))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::transport(format!(
                    "device did not answer within {:?}",
                    timing.command_timeout
                )))
            }
        };

        shared.with_hooks(|hooks| hooks.update(outcome, command))?;

        let count = shared.completed.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("Command #{} completed", count);
        shared.emit(EngineEvent::CommandCompleted { count });
    }
}
