//! Transport abstraction traits for Warren.
//!
//! These traits define the interface a transport must provide so the
//! session layer only ever sees protocol headers and whole frames.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use warren_protocol::frame::PROTOCOL_HEADER_SIZE;
use warren_protocol::{Frame, FrameError};

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Next process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{n:x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// The peer sent a malformed frame.
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A transport that can accept connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept a new connection.
    ///
    /// Blocks until a new connection is available or an error occurs.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Transport name, e.g. "tcp".
    fn name(&self) -> &'static str;

    fn is_healthy(&self) -> bool {
        true
    }
}

/// An active connection over a transport.
///
/// A connection starts with the 8-byte protocol header exchange and then
/// carries whole frames in both directions.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> &ConnectionId;

    /// Read the peer's protocol header.
    async fn recv_protocol_header(&mut self) -> Result<[u8; PROTOCOL_HEADER_SIZE], TransportError>;

    /// Write a protocol header, used to tell the peer which version the
    /// broker speaks when it asked for another.
    async fn send_protocol_header(&mut self, header: [u8; PROTOCOL_HEADER_SIZE]) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Returns `None` if the peer closed the connection cleanly between frames.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Send a frame.
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send frames in order.
    async fn send_all(&mut self, frames: Vec<Frame>) -> Result<(), TransportError> {
        for frame in frames {
            self.send(frame).await?;
        }
        Ok(())
    }

    /// Limit the size of inbound frames, after tuning.
    fn set_max_frame_size(&mut self, max: usize);

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    fn remote_addr(&self) -> Option<String> {
        None
    }

    fn is_open(&self) -> bool;
}
