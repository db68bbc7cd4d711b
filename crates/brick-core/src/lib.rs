//! # brick-core - Shared Foundations
//!
//! Foundation crate for brickcommand. Provides the error type shared by every
//! layer and the logging bootstrap.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (thiserror, tracing, tracing-subscriber, tracing-appender, dirs).
//!
//! ## Public API
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum covering codec, device, controller and engine failures
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding logged context
//!
//! ### Logging (`logging`)
//! - [`logging::init()`] - Install the rolling-file tracing subscriber
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use brick_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod prelude;

pub use error::{Error, Result, ResultExt};
