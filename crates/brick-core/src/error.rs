//! Error types shared by the codec, device and engine layers

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error types organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// Cooperative stop request observed by a task. Never an error condition.
    #[error("Task cancelled")]
    Cancelled,

    // ─────────────────────────────────────────────────────────────
    // Wire Codec Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Malformed device message: {reason}")]
    MalformedMessage { reason: String },

    // ─────────────────────────────────────────────────────────────
    // Device Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Device transport error: {message}")]
    DeviceTransport { message: String },

    // ─────────────────────────────────────────────────────────────
    // Controller Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Controller error: {message}")]
    Controller { message: String },

    #[error("Controller has no more input")]
    ControllerClosed,

    // ─────────────────────────────────────────────────────────────
    // Engine Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Engine hook failed: {message}")]
    Hook { message: String },

    #[error("Engine error: {message}")]
    Engine { message: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::DeviceTransport {
            message: message.into(),
        }
    }

    pub fn controller(message: impl Into<String>) -> Self {
        Self::Controller {
            message: message.into(),
        }
    }

    pub fn hook(message: impl Into<String>) -> Self {
        Self::Hook {
            message: message.into(),
        }
    }

    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is an expected stop signal rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Cancelled | Error::ControllerClosed)
    }

    /// Check if the caller can drop the offending item and carry on
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedMessage { .. } | Error::Controller { .. } | Error::Config { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}
