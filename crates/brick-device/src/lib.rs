//! # brick-device - Brick Communication
//!
//! Wire codec, framing and the device capability used to drive a brick.
//!
//! Depends on [`brick_core`] for error handling.
//!
//! ## Public API
//!
//! ### Wire Codec
//! - [`DeviceMessage`] - Encode/decode named mailbox writes
//! - [`Payload`] - Numeric, text or logic mailbox value
//! - [`SequenceCounter`] - Message id generator owned by the encoder
//!
//! ### Framing
//! - [`read_frame()`], [`read_message()`], [`write_frame()`] - Length-prefixed
//!   frames over tokio byte streams
//!
//! ### Device Capability
//! - [`Brick`] - Submit a command, await its result
//! - [`MailboxBrick`] - [`Brick`] writing [`MailboxCommand`]s to any async writer

pub mod brick;
pub mod framing;
pub mod mailbox;
pub mod message;
pub mod sequence;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use brick::Brick;
pub use framing::{read_frame, read_message, write_frame};
pub use mailbox::{MailboxBrick, MailboxCommand, MailboxReceipt};
pub use message::{
    DeviceMessage, Payload, DIRECT_COMMAND_NO_REPLY, LENGTH_PREFIX_LEN, MAX_MAILBOX_NAME_LEN,
    WRITE_MAILBOX,
};
pub use sequence::{SequenceCounter, INITIAL_SEQUENCE};
