//! Per-connection handle
//!
//! A handle owns one subscriber's transport. All writes go through
//! [`ConnectionHandle::send`], which holds the handle's write lock for the
//! whole frame, so a heartbeat and a record can never interleave on the wire.
//!
//! ```text
//!   Open ──(record ok | heartbeat ok)──► Open
//!   Open ──(write error | timeout | expiry | client hang-up)──► Closed
//! ```
//!
//! `Closed` is terminal. A client that wants more events must subscribe again
//! and gets a new id.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::error::DeliveryError;

/// Unique connection identifier
pub type ConnectionId = String;

/// Byte sink for one subscriber's event stream
pub type Transport = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepting writes
    Open,
    /// Torn down
    Closed,
}

/// One registered subscriber
pub struct ConnectionHandle {
    id: ConnectionId,

    /// `None` once the transport has been released
    transport: Mutex<Option<Transport>>,

    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,

    registered_at: Instant,

    /// Milliseconds after `registered_at` of the last successful record write
    last_activity_ms: AtomicU64,

    write_timeout: Duration,
    frames_sent: AtomicU64,
}

impl ConnectionHandle {
    pub(super) fn new(id: ConnectionId, transport: Transport, write_timeout: Duration) -> Self {
        let (closed_tx, _) = watch::channel(false);

        Self {
            id,
            transport: Mutex::new(Some(transport)),
            closed: AtomicBool::new(false),
            closed_tx,
            registered_at: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            write_timeout,
            frames_sent: AtomicU64::new(0),
        }
    }

    /// Connection id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        if self.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    /// Whether the connection has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// When the connection was registered
    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    /// Registration time or last successful record delivery, whichever is later
    pub fn last_activity(&self) -> Instant {
        self.registered_at + Duration::from_millis(self.last_activity_ms.load(Ordering::Relaxed))
    }

    /// Whether the connection has been idle for longer than `timeout`
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_activity()) > timeout
    }

    /// Number of frames written successfully
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Mark activity now
    pub(super) fn touch(&self) {
        let elapsed = self.registered_at.elapsed().as_millis() as u64;
        self.last_activity_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    /// Write one complete frame
    ///
    /// Waiting for the write lock counts against the write timeout.
    pub async fn send(&self, frame: &Bytes) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::TransportClosed);
        }

        let write = async {
            let mut guard = self.transport.lock().await;
            let transport = guard.as_mut().ok_or(DeliveryError::TransportClosed)?;
            transport.write_all(frame).await?;
            transport.flush().await?;
            Ok::<(), DeliveryError>(())
        };

        tokio::time::timeout(self.write_timeout, write)
            .await
            .map_err(|_| DeliveryError::WriteTimeout(self.write_timeout))??;

        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Wait until the connection is closed
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Tear down the connection and release its transport
    ///
    /// Returns `true` only for the call that performed the teardown.
    pub(super) async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed_tx.send_replace(true);

        let release = async {
            let transport = self.transport.lock().await.take();
            match transport {
                Some(mut transport) => transport.shutdown().await,
                None => Ok(()),
            }
        };

        match tokio::time::timeout(self.write_timeout, release).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Transport shutdown failed");
            }
            Err(_) => {
                tracing::debug!(connection_id = %self.id, "Transport shutdown timed out");
            }
        }

        true
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("frames_sent", &self.frames_sent())
            .finish()
    }
}
