use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{ReplicaMessage, MAX_MESSAGE_SIZE};

/// Length of the frame header: 4-byte length plus 1-byte type tag.
const HEADER_LEN: usize = 5;

/// Codec for encoding/decoding replica messages on byte channels.
pub struct ReplicaCodec;

impl ReplicaCodec {
    /// Encode a message with framing: [4 bytes len][1 byte tag][JSON payload]
    ///
    /// `len` counts the tag byte plus the payload.
    pub fn encode(msg: &ReplicaMessage) -> ProtocolResult<Vec<u8>> {
        let payload = Self::encode_payload(msg)?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: payload.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        let len = (payload.len() + 1) as u32;
        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(msg.type_tag());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode one framed message from the front of `data`.
    /// Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(ReplicaMessage, usize)> {
        if data.len() < HEADER_LEN {
            return Err(ProtocolError::Incomplete {
                have: data.len(),
                need: HEADER_LEN,
            });
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len < 1 {
            return Err(ProtocolError::FramingError("zero-length frame".into()));
        }
        if len - 1 > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: len - 1,
                max: MAX_MESSAGE_SIZE,
            });
        }
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::Incomplete {
                have: data.len(),
                need: total,
            });
        }
        let tag = data[4];
        let msg = Self::decode_payload(&data[HEADER_LEN..total])?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        Ok((msg, total))
    }

    /// Decode every complete frame in `data`. Returns the messages and the
    /// number of bytes consumed; a trailing partial frame is left unread.
    /// A malformed frame anywhere in `data` is an error.
    pub fn decode_all(data: &[u8]) -> ProtocolResult<(Vec<ReplicaMessage>, usize)> {
        let mut messages = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            match Self::decode(&data[offset..]) {
                Ok((msg, consumed)) => {
                    messages.push(msg);
                    offset += consumed;
                }
                Err(ProtocolError::Incomplete { .. }) => break,
                Err(err) => return Err(err),
            }
        }
        Ok((messages, offset))
    }

    /// Encode payload only (no framing).
    pub fn encode_payload(msg: &ReplicaMessage) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Decode payload only (no framing).
    pub fn decode_payload(data: &[u8]) -> ProtocolResult<ReplicaMessage> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Deserialization(e.to_string()))
    }
}
