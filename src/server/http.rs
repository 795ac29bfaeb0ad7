//! Minimal HTTP/1.1 handling for the event stream endpoint
//!
//! Only the request line matters: the server answers a `GET` on the stream
//! path with event-stream headers and then keeps the connection open for SSE
//! frames. Everything else gets a short error response and is closed.
//!
//! ```text
//! Client                                     Server
//!   |--- GET /api/image-metadata/stream ---->|
//!   |<-- 200 OK, text/event-stream ----------|
//!   |<-- data:{...}\n\n ---------------------|
//!   |<-- :heartbeat\n\n ---------------------|
//!   |          ...                           |
//! ```

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Response head sent before the first event
pub const EVENT_STREAM_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Cache-Control: no-cache\r\n\
Connection: keep-alive\r\n\
Access-Control-Allow-Origin: *\r\n\
X-Accel-Buffering: no\r\n\
\r\n";

/// Parsed request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET`
    pub method: String,
    /// Path without query string
    pub path: String,
}

impl RequestHead {
    /// Parse the request line out of a complete head
    pub fn parse(head: &[u8]) -> io::Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| invalid("Request head is not UTF-8"))?;
        let line = text
            .split("\r\n")
            .next()
            .ok_or_else(|| invalid("Empty request"))?;

        let mut parts = line.split_whitespace();
        let method = parts.next().ok_or_else(|| invalid("Missing method"))?;
        let target = parts.next().ok_or_else(|| invalid("Missing request target"))?;
        let version = parts.next().ok_or_else(|| invalid("Missing HTTP version"))?;

        if !version.starts_with("HTTP/1.") {
            return Err(invalid("Unsupported HTTP version"));
        }

        let path = target.split(['?', '#']).next().unwrap_or(target);

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
        })
    }
}

/// What to do with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Open an event stream
    Stream,
    /// Unknown path
    NotFound,
    /// Known path, wrong method
    MethodNotAllowed,
}

impl Route {
    /// Route a request against the configured stream path
    pub fn for_request(head: &RequestHead, stream_path: &str) -> Self {
        if head.path != stream_path {
            Route::NotFound
        } else if head.method != "GET" {
            Route::MethodNotAllowed
        } else {
            Route::Stream
        }
    }
}

/// Read bytes until the end of the request head
///
/// Returns `Ok(None)` if the peer closes before sending a complete head.
pub async fn read_request_head<R>(reader: &mut R, max_size: usize) -> io::Result<Option<RequestHead>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if let Some(end) = find_terminator(&buf) {
            return RequestHead::parse(&buf[..end]).map(Some);
        }
        if buf.len() >= max_size {
            return Err(invalid("Request head too large"));
        }
        if reader.read_buf(&mut buf).await? == 0 {
            return Ok(None);
        }
    }
}

/// Build a short response that closes the connection
pub fn error_response(status: u16, reason: &str) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    ))
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
}

fn invalid(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
