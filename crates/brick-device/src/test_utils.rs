//! Test utilities for device types
//!
//! Provides a scriptable in-memory [`Brick`] for engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use brick_core::prelude::*;

use super::Brick;

type Responder<C, O> = Box<dyn FnMut(&C) -> Result<O> + Send>;

/// A brick that records every command and answers through a closure.
///
/// # Arguments
/// * `respond` - Produces the outcome (or error) for each command
///
/// Use [`RecordingBrick::calls`] to keep a handle on the recorded commands
/// after the brick has been moved into an engine.
pub struct RecordingBrick<C, O> {
    calls: Arc<Mutex<Vec<C>>>,
    respond: Responder<C, O>,
    latency: Duration,
}

impl<C, O> RecordingBrick<C, O>
where
    C: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    pub fn new(respond: impl FnMut(&C) -> Result<O> + Send + 'static) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            respond: Box::new(respond),
            latency: Duration::ZERO,
        }
    }

    /// Make each round trip take `latency` between recording the command and answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Shared handle on the commands received so far
    pub fn calls(&self) -> Arc<Mutex<Vec<C>>> {
        Arc::clone(&self.calls)
    }
}

impl<C, O> Brick for RecordingBrick<C, O>
where
    C: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    type Command = C;
    type Outcome = O;

    async fn process(&mut self, command: &C) -> Result<O> {
        self.calls
            .lock()
            .map_err(|_| Error::transport("recording lock poisoned"))?
            .push(command.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        (self.respond)(command)
    }
}

/// A brick that answers every command with `Ok(())`
pub fn ack_brick<C>() -> RecordingBrick<C, ()>
where
    C: Clone + Send + Sync + 'static,
{
    RecordingBrick::new(|_| Ok(()))
}
