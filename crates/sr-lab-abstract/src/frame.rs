use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PayloadError;

/// Fixed payload size carried by every frame.
pub const PAYLOAD_LEN: usize = 20;

/// Wire value of `acknum` on data frames.
pub const NOT_IN_USE: i32 = -1;

/// Application payload. Opaque to the protocol, copied verbatim into frames.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message(pub [u8; PAYLOAD_LEN]);

impl Message {
    pub const fn new(bytes: [u8; PAYLOAD_LEN]) -> Self {
        Self(bytes)
    }

    /// A message made of one repeated byte (the classic emulator workload).
    pub const fn filled(byte: u8) -> Self {
        Self([byte; PAYLOAD_LEN])
    }

    /// Build a message from text, padding with zero bytes.
    pub fn from_text(text: &str) -> Result<Self, PayloadError> {
        Self::try_from(text.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; PAYLOAD_LEN] {
        &self.0
    }

    /// Payload bytes without the zero padding added by [`Message::from_text`].
    pub fn trimmed(&self) -> &[u8] {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        &self.0[..end]
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = PayloadError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() > PAYLOAD_LEN {
            return Err(PayloadError::TooLong { len: data.len() });
        }
        let mut bytes = [0u8; PAYLOAD_LEN];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", String::from_utf8_lossy(self.trimmed()))
    }
}

/// The unit handed to the channel.
///
/// Fields are kept in their wire representation so that the channel can
/// damage any of them; the checksum is the only thing that tells a damaged
/// frame apart from a good one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Sequence number (data frames) or the nominal toggle value (ACKs).
    pub seqnum: i32,
    /// Acknowledged sequence number, [`NOT_IN_USE`] on data frames.
    pub acknum: i32,
    pub checksum: i32,
    pub payload: Message,
}

impl Frame {
    /// `acknum` as an option, `None` for data frames.
    pub fn ack_number(&self) -> Option<i32> {
        (self.acknum != NOT_IN_USE).then_some(self.acknum)
    }
}
