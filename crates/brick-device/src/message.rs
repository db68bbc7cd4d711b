//! Brick mailbox wire codec
//!
//! A mailbox write travels as a little-endian, length-prefixed frame:
//!
//! ```text
//! ┌──────────┬──────────┬──────┬──────┬─────────┬────────────┬─────────────┬──────────┐
//! │ len: u16 │ seq: u16 │ 0x81 │ 0x9E │ n: u8   │ name + NUL │ plen: u16   │ payload  │
//! └──────────┴──────────┴──────┴──────┴─────────┴────────────┴─────────────┴──────────┘
//! ```
//!
//! `len` counts every byte after itself and `n` includes the terminator.
//! Transports strip `len` before handing a body to [`DeviceMessage::decode`];
//! [`DeviceMessage::decode_frame`] accepts the full frame instead.
//!
//! The wire carries no payload type tag, so decoded payloads stay raw and are
//! interpreted through [`DeviceMessage::numeric`], [`DeviceMessage::text`] or
//! [`DeviceMessage::logic`].

use brick_core::prelude::*;

use crate::sequence::SequenceCounter;

/// Command type byte: direct command, no reply expected.
pub const DIRECT_COMMAND_NO_REPLY: u8 = 0x81;

/// System opcode byte: write to a named mailbox.
pub const WRITE_MAILBOX: u8 = 0x9E;

/// Size of the outer length prefix.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Longest mailbox name that fits the one-byte length field (terminator excluded).
pub const MAX_MAILBOX_NAME_LEN: usize = u8::MAX as usize - 1;

/// Smallest possible body: sequence, two fixed bytes, name length, one-char
/// name with terminator, payload length.
const MIN_BODY_LEN: usize = 2 + 2 + 1 + 2 + 2;

/// Typed value written into a mailbox
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 4-byte IEEE-754 float, little-endian
    Numeric(f32),
    /// UTF-8 text followed by a NUL terminator
    Text(String),
    /// Single byte, `1` for true and `0` for false
    Logic(bool),
}

impl Payload {
    /// Short name of the payload kind for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Numeric(_) => "numeric",
            Payload::Text(_) => "text",
            Payload::Logic(_) => "logic",
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Numeric(value) => Ok(value.to_le_bytes().to_vec()),
            Payload::Text(text) => {
                if text.as_bytes().contains(&0) {
                    return Err(Error::malformed("text payload contains a NUL byte"));
                }
                let mut bytes = Vec::with_capacity(text.len() + 1);
                bytes.extend_from_slice(text.as_bytes());
                bytes.push(0);
                Ok(bytes)
            }
            Payload::Logic(flag) => Ok(vec![u8::from(*flag)]),
        }
    }
}

impl From<f32> for Payload {
    fn from(value: f32) -> Self {
        Payload::Numeric(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Logic(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

/// A decoded mailbox message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMessage {
    pub sequence: u16,
    pub mailbox: String,
    /// Raw payload bytes as they appeared on the wire
    pub payload: Vec<u8>,
}

impl DeviceMessage {
    /// Encode a mailbox write, tagging it with the counter's next sequence id.
    ///
    /// The id is only taken once the message is known to be encodable.
    pub fn encode(counter: &SequenceCounter, mailbox: &str, payload: &Payload) -> Result<Vec<u8>> {
        let payload_bytes = payload.to_bytes()?;
        validate_mailbox_name(mailbox)?;
        check_lengths(mailbox, &payload_bytes)?;

        Ok(build_frame(counter.next(), mailbox, &payload_bytes))
    }

    /// Encode with an explicit sequence id
    pub fn encode_with_sequence(sequence: u16, mailbox: &str, payload: &Payload) -> Result<Vec<u8>> {
        let payload_bytes = payload.to_bytes()?;
        validate_mailbox_name(mailbox)?;
        check_lengths(mailbox, &payload_bytes)?;

        Ok(build_frame(sequence, mailbox, &payload_bytes))
    }

    /// Decode a message body (everything after the outer length prefix)
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < MIN_BODY_LEN {
            return Err(Error::malformed(format!(
                "body of {} bytes is shorter than the {} byte minimum",
                body.len(),
                MIN_BODY_LEN
            )));
        }

        let mut cursor = Cursor::new(body);

        let sequence = cursor.read_u16("sequence id")?;

        let kind = cursor.read_u8("command type")?;
        let opcode = cursor.read_u8("opcode")?;
        if kind != DIRECT_COMMAND_NO_REPLY || opcode != WRITE_MAILBOX {
            return Err(Error::malformed(format!(
                "unexpected command bytes {:02X} {:02X}",
                kind, opcode
            )));
        }

        let name_len = cursor.read_u8("name length")? as usize;
        if name_len == 0 {
            return Err(Error::malformed("mailbox name length is zero"));
        }
        let name_bytes = cursor.take(name_len, "mailbox name")?;
        let (terminator, name_bytes) = name_bytes
            .split_last()
            .ok_or_else(|| Error::malformed("mailbox name is empty"))?;
        if *terminator != 0 {
            return Err(Error::malformed("mailbox name is not NUL-terminated"));
        }
        let mailbox = std::str::from_utf8(name_bytes)
            .map_err(|e| Error::malformed(format!("mailbox name is not UTF-8: {}", e)))?
            .to_string();

        let payload_len = cursor.read_u16("payload length")? as usize;
        if cursor.remaining() != payload_len {
            return Err(Error::malformed(format!(
                "payload length {} does not match {} remaining bytes",
                payload_len,
                cursor.remaining()
            )));
        }
        let payload = cursor.take(payload_len, "payload")?.to_vec();

        Ok(Self {
            sequence,
            mailbox,
            payload,
        })
    }

    /// Decode a full frame, checking the length prefix against the buffer
    pub fn decode_frame(frame: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(frame);
        let declared = cursor.read_u16("length prefix")? as usize;
        if cursor.remaining() != declared {
            return Err(Error::malformed(format!(
                "length prefix {} does not match {} body bytes",
                declared,
                cursor.remaining()
            )));
        }
        Self::decode(cursor.rest())
    }

    /// Interpret the payload as a 4-byte float
    pub fn numeric(&self) -> Result<f32> {
        let bytes: [u8; 4] = self.payload.as_slice().try_into().map_err(|_| {
            Error::malformed(format!(
                "numeric payload must be 4 bytes, got {}",
                self.payload.len()
            ))
        })?;
        Ok(f32::from_le_bytes(bytes))
    }

    /// Interpret the payload as NUL-terminated text
    pub fn text(&self) -> Result<&str> {
        let (terminator, text) = self
            .payload
            .split_last()
            .ok_or_else(|| Error::malformed("text payload is empty"))?;
        if *terminator != 0 {
            return Err(Error::malformed("text payload is not NUL-terminated"));
        }
        std::str::from_utf8(text)
            .map_err(|e| Error::malformed(format!("text payload is not UTF-8: {}", e)))
    }

    /// Interpret the payload as a single logic byte (non-zero is true)
    pub fn logic(&self) -> Result<bool> {
        match self.payload.as_slice() {
            [byte] => Ok(*byte != 0),
            other => Err(Error::malformed(format!(
                "logic payload must be 1 byte, got {}",
                other.len()
            ))),
        }
    }
}

fn validate_mailbox_name(mailbox: &str) -> Result<()> {
    if mailbox.is_empty() {
        return Err(Error::malformed("mailbox name is empty"));
    }
    if mailbox.as_bytes().contains(&0) {
        return Err(Error::malformed("mailbox name contains a NUL byte"));
    }
    if mailbox.len() > MAX_MAILBOX_NAME_LEN {
        return Err(Error::malformed(format!(
            "mailbox name is {} bytes, limit is {}",
            mailbox.len(),
            MAX_MAILBOX_NAME_LEN
        )));
    }
    Ok(())
}

fn check_lengths(mailbox: &str, payload: &[u8]) -> Result<()> {
    if payload.len() > u16::MAX as usize {
        return Err(Error::malformed(format!(
            "payload is {} bytes, limit is {}",
            payload.len(),
            u16::MAX
        )));
    }
    if body_len(mailbox, payload) > u16::MAX as usize {
        return Err(Error::malformed("message does not fit the 16-bit length prefix"));
    }
    Ok(())
}

fn body_len(mailbox: &str, payload: &[u8]) -> usize {
    2 + 2 + 1 + mailbox.len() + 1 + 2 + payload.len()
}

/// Assemble a frame from already validated parts
fn build_frame(sequence: u16, mailbox: &str, payload: &[u8]) -> Vec<u8> {
    let body_len = body_len(mailbox, payload);
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + body_len);

    frame.extend_from_slice(&(body_len as u16).to_le_bytes());
    frame.extend_from_slice(&sequence.to_le_bytes());
    frame.push(DIRECT_COMMAND_NO_REPLY);
    frame.push(WRITE_MAILBOX);
    frame.push((mailbox.len() + 1) as u8);
    frame.extend_from_slice(mailbox.as_bytes());
    frame.push(0);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);

    frame
}

/// Bounds-checked reader over a byte slice
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(Error::malformed(format!(
                "{} needs {} bytes but only {} remain",
                field,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    fn read_u16(&mut self, field: &str) -> Result<u16> {
        let bytes = self.take(2, field)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}
