//! The device capability consumed by the control engine

use brick_core::prelude::*;

/// A device that accepts commands and answers each with a result.
///
/// One round trip per call. Implementations may take as long as their
/// transport needs; the engine never holds its state lock across a call.
/// The command is only borrowed: once the result arrives, the engine hands
/// both back to its update hook.
#[trait_variant::make(Send)]
pub trait Brick {
    /// Command sent to the device
    type Command: Send + Sync;
    /// Result returned for a command
    type Outcome: Send;

    /// Send `command` and wait for the device's answer.
    ///
    /// Fails with [`Error::DeviceTransport`] when the round trip cannot be
    /// completed.
    async fn process(&mut self, command: &Self::Command) -> Result<Self::Outcome>;
}
