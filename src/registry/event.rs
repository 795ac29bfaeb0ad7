//! Stream events and their wire framing
//!
//! Subscribers receive a server-sent event stream:
//!
//! ```text
//! data:{"timestamp":1757493783675,"centerX":10.0,...,"peopleCount":2}\n\n
//! :heartbeat\n\n
//! ```
//!
//! A frame is encoded once into `Bytes` and shared by every connection it is
//! written to.

use bytes::{BufMut, Bytes, BytesMut};

use crate::record::DetectionRecord;

/// Encoded heartbeat comment frame
pub const HEARTBEAT_FRAME: &[u8] = b":heartbeat\n\n";

const DATA_PREFIX: &[u8] = b"data:";
const FRAME_TERMINATOR: &[u8] = b"\n\n";

/// Something that can be written to a subscriber stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A detection record
    Record(DetectionRecord),
    /// Keep-alive comment, no payload
    Heartbeat,
}

impl StreamEvent {
    /// Type name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Record(_) => "record",
            StreamEvent::Heartbeat => "heartbeat",
        }
    }

    /// Encode as a complete SSE frame
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        match self {
            StreamEvent::Record(record) => {
                let json = serde_json::to_vec(record)?;
                let mut buf =
                    BytesMut::with_capacity(DATA_PREFIX.len() + json.len() + FRAME_TERMINATOR.len());
                buf.put_slice(DATA_PREFIX);
                buf.put_slice(&json);
                buf.put_slice(FRAME_TERMINATOR);
                Ok(buf.freeze())
            }
            StreamEvent::Heartbeat => Ok(Bytes::from_static(HEARTBEAT_FRAME)),
        }
    }
}
