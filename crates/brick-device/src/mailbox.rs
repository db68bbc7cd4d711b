//! Mailbox brick: writes named mailbox values over a byte stream

use std::sync::Arc;

use tokio::io::AsyncWrite;

use brick_core::prelude::*;

use crate::brick::Brick;
use crate::framing::write_frame;
use crate::message::{DeviceMessage, Payload};
use crate::sequence::SequenceCounter;

/// A value to write into one of the brick's mailboxes
#[derive(Debug, Clone, PartialEq)]
pub struct MailboxCommand {
    pub mailbox: String,
    pub payload: Payload,
}

impl MailboxCommand {
    pub fn new(mailbox: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            mailbox: mailbox.into(),
            payload: payload.into(),
        }
    }
}

/// Acknowledgement of a mailbox write.
///
/// Mailbox writes are sent as "no reply" direct commands, so the receipt only
/// records what went out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxReceipt {
    pub sequence: u16,
    pub bytes_written: usize,
}

/// [`Brick`] that frames [`MailboxCommand`]s onto any async writer.
///
/// Owns the [`SequenceCounter`] used to number its messages; the counter is
/// shared through an `Arc` so callers can reset or inspect it.
pub struct MailboxBrick<W> {
    writer: W,
    counter: Arc<SequenceCounter>,
}

impl<W> std::fmt::Debug for MailboxBrick<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxBrick")
            .field("writer", &"<transport>")
            .field("counter", &self.counter)
            .finish()
    }
}

impl<W> MailboxBrick<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self::with_counter(writer, Arc::new(SequenceCounter::new()))
    }

    pub fn with_counter(writer: W, counter: Arc<SequenceCounter>) -> Self {
        Self { writer, counter }
    }

    /// The counter numbering this brick's messages
    pub fn counter(&self) -> &Arc<SequenceCounter> {
        &self.counter
    }

    /// Give back the underlying transport
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> Brick for MailboxBrick<W>
where
    W: AsyncWrite + Unpin + Send,
{
    type Command = MailboxCommand;
    type Outcome = MailboxReceipt;

    async fn process(&mut self, command: &MailboxCommand) -> Result<MailboxReceipt> {
        let frame = DeviceMessage::encode(&self.counter, &command.mailbox, &command.payload)?;
        let sequence = u16::from_le_bytes([frame[2], frame[3]]);

        debug!(
            "Writing mailbox '{}' ({}) as message #{}",
            command.mailbox,
            command.payload.kind(),
            sequence
        );

        write_frame(&mut self.writer, &frame).await?;

        Ok(MailboxReceipt {
            sequence,
            bytes_written: frame.len(),
        })
    }
}
