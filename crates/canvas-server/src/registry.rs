//! Connection registry.
//!
//! Owns every live `Connection`, keyed by its `ConnectionId`. Other
//! components hold a connection only for the duration of one task and
//! otherwise refer to it by id.
//!
//! `teardown` is the single release path: whichever error path fires
//! first removes the entry, drops the readiness registration and shuts
//! the socket down. Later calls for the same id are no-ops.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use mio::unix::SourceFd;
use mio::Interest;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connection::{Connection, FlushStatus};
use crate::error::SessionError;
use crate::types::ConnectionId;

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
    poll: mio::Registry,
    max_clients: usize,
}

impl ConnectionRegistry {
    /// `poll` is a handle onto the reactor's `mio::Poll`.
    pub fn new(poll: mio::Registry, max_clients: usize) -> Self {
        ConnectionRegistry {
            connections: Mutex::new(HashMap::new()),
            poll,
            max_clients,
        }
    }

    /// Add a connection and start watching its socket.
    ///
    /// The socket is registered edge-triggered for both read and write
    /// readiness. Readiness already pending at registration time is
    /// reported on the next poll.
    pub fn insert(&self, conn: Connection) -> Result<Arc<Connection>, SessionError> {
        let conn = Arc::new(conn);
        let id = conn.id();

        {
            let mut map = self.connections.lock();
            if map.len() >= self.max_clients {
                return Err(SessionError::ServerFull {
                    limit: self.max_clients,
                });
            }
            map.insert(id, Arc::clone(&conn));
        }

        let fd = conn.raw_fd();
        if let Err(e) = self.poll.register(
            &mut SourceFd(&fd),
            id.token(),
            Interest::READABLE | Interest::WRITABLE,
        ) {
            self.teardown(id, "readiness registration failed");
            return Err(e.into());
        }

        info!("connection {} accepted from {}", id, conn.peer());
        Ok(conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.lock().get(&id).cloned()
    }

    /// Every connection currently in OPEN state.
    ///
    /// The lock is released before the caller touches any socket.
    pub fn open_connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .lock()
            .values()
            .filter(|c| c.is_open())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn open_count(&self) -> usize {
        self.connections
            .lock()
            .values()
            .filter(|c| c.is_open())
            .count()
    }

    /// Remove and close a connection. Returns false if it was already gone.
    pub fn teardown(&self, id: ConnectionId, reason: impl fmt::Display) -> bool {
        let removed = self.connections.lock().remove(&id);
        let Some(conn) = removed else {
            return false;
        };

        let fd = conn.raw_fd();
        if let Err(e) = self.poll.deregister(&mut SourceFd(&fd)) {
            debug!("connection {} deregister: {}", id, e);
        }
        conn.shutdown();

        info!("connection {} ({}) closed: {}", id, conn.peer(), reason);
        true
    }

    pub fn teardown_all(&self, reason: &str) -> usize {
        let ids: Vec<ConnectionId> = self.connections.lock().keys().copied().collect();
        ids.into_iter()
            .filter(|id| self.teardown(*id, reason))
            .count()
    }

    /// Queue `bytes` on `conn`; a failed send tears the connection down.
    pub fn send(&self, conn: &Connection, bytes: Bytes) -> bool {
        match conn.send(bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("connection {} send failed: {}", conn.id(), e);
                self.teardown(conn.id(), e);
                false
            }
        }
    }

    /// Writable edge: push the outbox and finish a pending close.
    pub fn flush(&self, conn: &Connection) {
        match conn.flush() {
            Ok(FlushStatus::Finished) => {
                self.teardown(conn.id(), "close handshake complete");
            }
            Ok(FlushStatus::Idle | FlushStatus::Pending) => {}
            Err(e) => {
                self.teardown(conn.id(), e);
            }
        }
    }

    /// Begin a graceful close; tears down immediately if nothing is
    /// waiting to be written.
    pub fn close_after_flush(&self, conn: &Connection) {
        if conn.close_after_flush() {
            self.teardown(conn.id(), "closed after flush");
        } else {
            debug!(
                "connection {} closing with {} bytes unsent",
                conn.id(),
                conn.queued_bytes()
            );
        }
    }

    #[cfg(test)]
    pub(crate) fn state_of(&self, id: ConnectionId) -> Option<crate::types::ConnectionState> {
        self.get(id).map(|c| c.state())
    }
}
