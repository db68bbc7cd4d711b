//! Message sequence numbering
//!
//! Every outgoing [`DeviceMessage`](crate::message::DeviceMessage) carries a
//! 16-bit sequence id. The counter is owned by whoever encodes messages (see
//! [`MailboxBrick`](crate::mailbox::MailboxBrick)) rather than living in a
//! global, so independent bricks and tests never share numbering.

use std::sync::atomic::{AtomicU16, Ordering};

/// First value handed out after construction or [`SequenceCounter::reset`].
pub const INITIAL_SEQUENCE: u16 = 1;

/// Monotonic generator of message sequence ids.
///
/// Safe to share between tasks. Values increase by one per call and wrap to
/// zero after `u16::MAX`, matching the width of the wire field.
#[derive(Debug)]
pub struct SequenceCounter {
    next: AtomicU16,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(INITIAL_SEQUENCE),
        }
    }

    /// Take the next sequence id
    pub fn next(&self) -> u16 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Peek at the id the next call to [`next`](Self::next) will return
    pub fn peek(&self) -> u16 {
        self.next.load(Ordering::SeqCst)
    }

    /// Restart numbering at [`INITIAL_SEQUENCE`].
    ///
    /// Meant for deterministic tests and explicit device restarts, not for
    /// use while messages are in flight.
    pub fn reset(&self) {
        self.next.store(INITIAL_SEQUENCE, Ordering::SeqCst);
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
