//! Extension points a concrete engine implements.
//!
//! A type implementing [`EngineHooks`] *is* the engine state: the control
//! engine keeps it behind a single mutex and only ever touches it through
//! these three methods, one call at a time.

use brick_core::prelude::*;

/// The three hooks driving a [`ControlEngine`](crate::ControlEngine).
///
/// Hooks run while the engine's state lock is held, so they must not block
/// for long and cannot await. Returning an error stops the task that called
/// the hook (a listener for [`process`](Self::process), the dispatcher for
/// the other two) and leaves the remaining tasks running.
pub trait EngineHooks: Send + 'static {
    /// Event produced by the engine's controllers
    type Input: Send + 'static;
    /// Command sent to the brick
    type Command: Send + Sync + 'static;
    /// Result the brick returns for a command
    type Outcome: Send + 'static;

    /// Fold one controller event into the state
    fn process(&mut self, event: Self::Input) -> Result<()>;

    /// Produce the next command to send, or `None` when there is nothing to do
    fn next_command(&mut self) -> Result<Option<Self::Command>>;

    /// Fold a device result, paired with the command that produced it, into the state
    fn update(&mut self, outcome: Self::Outcome, sent: Self::Command) -> Result<()>;
}
