//! Control engine: controller listeners plus a single brick dispatcher
//!
//! The engine owns:
//! - one listening task per controller, applying input through
//!   [`EngineHooks::process`]
//! - exactly one dispatch task, pulling commands from
//!   [`EngineHooks::next_command`], sending them to the brick and folding
//!   results back with [`EngineHooks::update`]
//!
//! The hooks value is the engine state. It sits behind one mutex that is only
//! held for the duration of a single hook call; the brick round trip always
//! happens outside it, so slow device I/O never blocks input handling.

mod tasks;

#[cfg(test)]
mod tests;

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;

use brick_core::prelude::*;
use brick_device::Brick;

use crate::config::{EngineSettings, Settings};
use crate::controller::Controller;
use crate::engine_event::EngineEvent;
use crate::hooks::EngineHooks;

pub use tasks::DISPATCH_TASK_NAME;
use tasks::{DispatchTiming, Shared};

/// Whether the engine's tasks are running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnginePhase {
    #[default]
    Stopped,
    Running,
}

/// A spawned task together with its stop signal
struct TaskSlot<T> {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<T>,
}

impl<T> TaskSlot<T> {
    fn request_stop(&self) {
        // The task may already have left its loop and dropped the receiver
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the task to finish, returning what it handed back
    async fn join(self) -> Option<T> {
        match self.handle.await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("Task {} did not finish cleanly: {}", self.name, e);
                None
            }
        }
    }
}

struct RunningTasks<B, C> {
    dispatch: TaskSlot<B>,
    listeners: Vec<TaskSlot<C>>,
}

/// Engine driving a brick `B` from controllers `C` through hooks `H`.
///
/// The engine must be started and stopped from within a tokio runtime.
/// Dropping a running engine closes the stop channels, so its tasks wind down
/// on their own; call [`stop`](Self::stop) to wait for them.
pub struct ControlEngine<H, B, C>
where
    H: EngineHooks,
{
    state: Arc<Mutex<H>>,
    brick: Option<B>,
    controllers: Vec<C>,
    settings: EngineSettings,
    wake: Arc<Notify>,
    completed: Arc<AtomicU64>,
    event_tx: broadcast::Sender<EngineEvent>,
    running: Option<RunningTasks<B, C>>,
}

impl<H, B, C> std::fmt::Debug for ControlEngine<H, B, C>
where
    H: EngineHooks,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlEngine")
            .field("phase", &self.phase())
            .field("controllers", &self.controller_count())
            .field("has_brick", &self.brick.is_some())
            .field("settings", &self.settings)
            .finish()
    }
}

impl<H, B, C> ControlEngine<H, B, C>
where
    H: EngineHooks,
    B: Brick<Command = H::Command, Outcome = H::Outcome> + Send + 'static,
    C: Controller<Event = H::Input> + Send + 'static,
{
    /// Create a stopped engine with default settings
    pub fn new(hooks: H, controllers: impl IntoIterator<Item = C>, brick: B) -> Self {
        Self::with_settings(hooks, controllers, brick, EngineSettings::default())
    }

    /// Create a stopped engine driven by a single controller
    pub fn with_controller(hooks: H, controller: C, brick: B) -> Self {
        Self::new(hooks, std::iter::once(controller), brick)
    }

    /// Create a stopped engine configured from a loaded settings file.
    ///
    /// Pair with [`load_settings`](crate::config::load_settings) to honour
    /// `.brickcommand/config.toml`.
    pub fn from_settings(
        hooks: H,
        controllers: impl IntoIterator<Item = C>,
        brick: B,
        settings: &Settings,
    ) -> Self {
        debug!("Engine settings: {:?}", settings.engine);
        Self::with_settings(hooks, controllers, brick, settings.engine.clone())
    }

    /// Create a stopped engine with explicit settings
    pub fn with_settings(
        hooks: H,
        controllers: impl IntoIterator<Item = C>,
        brick: B,
        settings: EngineSettings,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(settings.event_capacity());
        Self {
            state: Arc::new(Mutex::new(hooks)),
            brick: Some(brick),
            controllers: controllers.into_iter().collect(),
            settings,
            wake: Arc::new(Notify::new()),
            completed: Arc::new(AtomicU64::new(0)),
            event_tx,
            running: None,
        }
    }

    /// Spawn one listener per controller and the dispatch task.
    ///
    /// Fails if the engine is already running, if the state was poisoned by a
    /// panic outside the hooks, or if an earlier run lost the brick to a
    /// panicked dispatch task.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::engine("engine is already running"));
        }
        if self.state.is_poisoned() {
            return Err(Error::engine("engine state was poisoned by a panic"));
        }
        let brick = self
            .brick
            .take()
            .ok_or_else(|| Error::engine("brick was lost by a previous run"))?;

        let shared = self.shared();
        let timing = DispatchTiming {
            idle_interval: self.settings.idle_interval(),
            command_timeout: self.settings.command_timeout(),
        };

        let listeners: Vec<TaskSlot<C>> = self
            .controllers
            .drain(..)
            .enumerate()
            .map(|(index, controller)| {
                let name = format!("{}#{}", controller.name(), index);
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let handle = tokio::spawn(tasks::listen(
                    name.clone(),
                    controller,
                    shared.clone(),
                    shutdown_rx,
                ));
                TaskSlot {
                    name,
                    shutdown_tx,
                    handle,
                }
            })
            .collect();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(tasks::dispatch(brick, shared, timing, shutdown_rx));
        let dispatch = TaskSlot {
            name: DISPATCH_TASK_NAME.to_string(),
            shutdown_tx,
            handle,
        };

        info!("Engine started with {} listener(s)", listeners.len());
        let _ = self.event_tx.send(EngineEvent::Started {
            listeners: listeners.len(),
        });

        self.running = Some(RunningTasks {
            dispatch,
            listeners,
        });
        Ok(())
    }

    /// Stop all tasks and wait until each one has finished.
    ///
    /// The dispatch task goes first: a command already sent to the brick
    /// completes and its result is applied before any listener is stopped.
    /// Stopping a stopped engine does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Engine already stopped");
            return;
        };

        info!("Stopping engine");

        running.dispatch.request_stop();
        self.brick = running.dispatch.join().await;

        for listener in &running.listeners {
            listener.request_stop();
        }
        for listener in running.listeners {
            if let Some(controller) = listener.join().await {
                self.controllers.push(controller);
            }
        }

        info!("Engine stopped");
        let _ = self.event_tx.send(EngineEvent::Stopped);
    }

    fn shared(&self) -> Shared<H> {
        Shared {
            state: Arc::clone(&self.state),
            wake: Arc::clone(&self.wake),
            events: self.event_tx.clone(),
            completed: Arc::clone(&self.completed),
        }
    }
}

impl<H, B, C> ControlEngine<H, B, C>
where
    H: EngineHooks,
{
    pub fn phase(&self) -> EnginePhase {
        if self.running.is_some() {
            EnginePhase::Running
        } else {
            EnginePhase::Stopped
        }
    }

    /// Number of tasks that have not yet left their loop
    pub fn running_tasks(&self) -> usize {
        self.running
            .as_ref()
            .map(|running| {
                let dispatch = usize::from(!running.dispatch.handle.is_finished());
                let listeners = running
                    .listeners
                    .iter()
                    .filter(|slot| !slot.handle.is_finished())
                    .count();
                dispatch + listeners
            })
            .unwrap_or(0)
    }

    /// Controllers registered with the engine, running or not
    pub fn controller_count(&self) -> usize {
        self.controllers.len()
            + self
                .running
                .as_ref()
                .map(|running| running.listeners.len())
                .unwrap_or(0)
    }

    /// Number of commands whose results have been applied
    pub fn completed_commands(&self) -> u64 {
        self.completed.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Subscribe to engine events.
    ///
    /// If the subscriber falls behind, older events are dropped. Use
    /// `broadcast::error::RecvError::Lagged` to detect this.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Read the engine state under the same lock the hooks use
    pub fn with_state<R>(&self, f: impl FnOnce(&H) -> R) -> Result<R> {
        let hooks = self
            .state
            .lock()
            .map_err(|_| Error::hook("engine state lock poisoned by an earlier panic"))?;
        Ok(f(&hooks))
    }
}
