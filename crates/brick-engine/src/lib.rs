//! # brick-engine - Controller-Driven Control Loop
//!
//! Turns controller input into brick commands and folds the brick's results
//! back into engine state.
//!
//! Depends on [`brick_core`] for error handling and [`brick_device`] for the
//! [`Brick`](brick_device::Brick) capability.
//!
//! ## Public API
//!
//! ### Engine
//! - [`ControlEngine`] - Owns the listening tasks and the dispatch task
//! - [`EngineHooks`] - `process` / `next_command` / `update` extension points
//! - [`EngineEvent`] - Lifecycle events from [`ControlEngine::subscribe`]
//!
//! ### Input
//! - [`Controller`] - Cancel-safe "wait for next input" capability
//! - [`ChannelController`], [`ControllerHandle`] - Channel-fed controller
//!
//! ### Configuration (`config`)
//! - [`config::load_settings()`] - Read `.brickcommand/config.toml`
//! - [`config::EngineSettings`] - Idle interval, command timeout, event buffer
//! - [`ControlEngine::from_settings`] - Build an engine from the loaded file

pub mod config;
pub mod controller;
pub mod engine;
pub mod engine_event;
pub mod hooks;

pub use config::{EngineSettings, Settings};
pub use controller::{ChannelController, Controller, ControllerHandle};
pub use engine::{ControlEngine, EnginePhase, DISPATCH_TASK_NAME};
pub use engine_event::{EngineEvent, TaskKind};
pub use hooks::EngineHooks;
