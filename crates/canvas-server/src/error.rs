//! Errors that end a single connection.
//!
//! None of these are fatal to the process; the registry tears the
//! connection down and everything else keeps running.

use std::io;

use canvas_protocol::{HandshakeError, ProtocolError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Receive staging buffer would exceed its capacity.
    #[error("receive buffer overflow ({len} bytes, capacity {capacity})")]
    BufferOverflow { len: usize, capacity: usize },

    /// Peer is not draining its socket fast enough.
    #[error("slow consumer ({queued} bytes queued, limit {limit})")]
    SlowConsumer { queued: usize, limit: usize },

    /// Plain HTTP request and no static files configured.
    #[error("not a websocket upgrade request")]
    NotWebSocket,

    #[error("server full ({limit} connections)")]
    ServerFull { limit: usize },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}
