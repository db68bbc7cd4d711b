//! Configuration types for brickcommand
//!
//! Defines:
//! - `Settings` - Root of `.brickcommand/config.toml`
//! - `EngineSettings` - Control loop timing

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lower bound for the idle re-check interval.
pub const MIN_IDLE_INTERVAL_MS: u64 = 1;

/// Lower bound for the device round-trip timeout.
pub const MIN_COMMAND_TIMEOUT_MS: u64 = 10;

/// Application settings (.brickcommand/config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Control loop settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineSettings {
    /// How long the dispatch task waits for new input before asking the
    /// hooks for a command again
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,

    /// Longest a single device round trip may take before the dispatch task
    /// gives up on the transport
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Buffer size of the engine event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            idle_interval_ms: default_idle_interval_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl EngineSettings {
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms.max(MIN_IDLE_INTERVAL_MS))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms.max(MIN_COMMAND_TIMEOUT_MS))
    }

    pub fn event_capacity(&self) -> usize {
        self.event_capacity.max(1)
    }
}

fn default_idle_interval_ms() -> u64 {
    20
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    64
}
