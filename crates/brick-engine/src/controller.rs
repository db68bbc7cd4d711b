//! Input sources feeding the control engine

use tokio::sync::mpsc;

use brick_core::prelude::*;

/// A source of input events (keyboard, joystick, network peer, ...).
///
/// The engine runs one listening task per controller and races
/// [`wait_for_next_input`](Controller::wait_for_next_input) against its stop
/// signal. The returned future must therefore be cancel-safe: dropping it
/// before completion must not lose an event that was already taken.
#[trait_variant::make(Send)]
pub trait Controller {
    type Event: Send;

    /// Name used in logs and engine events
    fn name(&self) -> &str;

    /// Wait until the next input event is available.
    ///
    /// Return [`Error::ControllerClosed`] once the source is exhausted; the
    /// listening task then ends quietly. Any other error is treated as a
    /// failure of this controller.
    async fn wait_for_next_input(&mut self) -> Result<Self::Event>;
}

/// Controller fed through an in-process channel.
///
/// Producers push events through the paired [`ControllerHandle`]; the
/// controller reports [`Error::ControllerClosed`] once every handle is gone.
#[derive(Debug)]
pub struct ChannelController<E> {
    name: String,
    rx: mpsc::Receiver<E>,
}

/// Cloneable sending side of a [`ChannelController`]
#[derive(Debug)]
pub struct ControllerHandle<E> {
    tx: mpsc::Sender<E>,
}

impl<E> Clone for ControllerHandle<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send> ChannelController<E> {
    /// Create a controller and its handle with room for `capacity` queued events
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, ControllerHandle<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                rx,
            },
            ControllerHandle { tx },
        )
    }
}

impl<E: Send> Controller for ChannelController<E> {
    type Event = E;

    fn name(&self) -> &str {
        &self.name
    }

    async fn wait_for_next_input(&mut self) -> Result<E> {
        self.rx.recv().await.ok_or(Error::ControllerClosed)
    }
}

impl<E> ControllerHandle<E> {
    /// Queue an event, waiting for room if the controller is backed up
    pub async fn send(&self, event: E) -> Result<()> {
        self.tx.send(event).await.map_err(|_| Error::ChannelClosed)
    }

    /// Queue an event without waiting
    pub fn try_send(&self, event: E) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::controller("input queue is full"),
            mpsc::error::TrySendError::Closed(_) => Error::ChannelClosed,
        })
    }

    /// Whether the controller side has been dropped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
