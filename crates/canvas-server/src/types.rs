//! Shared types for the canvas server.
//!
//! This module defines:
//! - `ConnectionId`: a stable handle for an accepted socket
//! - `ConnectionState`: the forward-only connection lifecycle
//! - `Task`: work handed from the reactor (and tickers) to the workers

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use mio::net::TcpStream;
use mio::Token;

/// Identifier for an accepted connection.
///
/// Allocated from a process-wide counter and never reused, so a stale
/// handle can only miss in the registry, never alias a newer socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn token(self) -> Token {
        Token(self.0 as usize)
    }

    pub fn from_token(token: Token) -> Self {
        ConnectionId(token.0 as u64)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection lifecycle. Only ever moves forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// Accepted, waiting for the HTTP upgrade request.
    Handshake = 0,
    /// Upgraded and receiving broadcasts.
    Open = 1,
    /// Last bytes are being flushed; input is ignored.
    Closing = 2,
    /// Removed from the registry, socket shut down.
    Closed = 3,
}

impl ConnectionState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ConnectionState::Handshake,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Unit of work for the worker pool.
///
/// Heap payloads move with the task; the consumer owns them.
#[derive(Debug)]
pub enum Task {
    /// Freshly accepted socket, not yet registered for readiness.
    NewConnection {
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
    },

    /// Bytes read from a connection, in arrival order.
    Data { id: ConnectionId, bytes: Bytes },

    /// EOF or read error on a connection.
    CloseConnection { id: ConnectionId },

    /// Encoded JSON delta to frame and fan out.
    Broadcast { payload: Bytes },
}

impl Task {
    pub fn connection(&self) -> Option<ConnectionId> {
        match self {
            Task::NewConnection { id, .. } | Task::Data { id, .. } | Task::CloseConnection { id } => {
                Some(*id)
            }
            Task::Broadcast { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Task::NewConnection { .. } => "new-connection",
            Task::Data { .. } => "data",
            Task::CloseConnection { .. } => "close-connection",
            Task::Broadcast { .. } => "broadcast",
        }
    }
}
