//! Lifecycle events emitted by the control engine
//!
//! Subscribe with [`ControlEngine::subscribe`](crate::ControlEngine::subscribe).
//! Events are informational; a lagging subscriber loses the oldest ones.

/// Which loop a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Waits on one controller and applies its events
    Listener,
    /// Produces commands and sends them to the brick
    Dispatch,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Listener => write!(f, "listener"),
            TaskKind::Dispatch => write!(f, "dispatch"),
        }
    }
}

/// Events emitted by the engine for external observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// All tasks were spawned
    Started { listeners: usize },

    /// A command round trip finished and its result was applied
    CommandCompleted { count: u64 },

    /// A task hit an error and stopped its loop
    TaskFailed {
        task: String,
        kind: TaskKind,
        error: String,
    },

    /// A task left its loop (after a stop request, end of input, or failure)
    TaskFinished { task: String, kind: TaskKind },

    /// Every task has been joined
    Stopped,
}

impl EngineEvent {
    /// Check if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, EngineEvent::TaskFailed { .. })
    }
}
