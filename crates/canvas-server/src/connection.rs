//! One accepted socket and its buffers.
//!
//! A `Connection` is owned by the registry and shared as
//! `Arc<Connection>` for the length of a single task. It carries:
//! - the forward-only lifecycle state (atomic, readable without locks),
//! - the inbound staging buffer plus message reassembly state,
//! - the outbox of encoded frames waiting for socket space.
//!
//! Lock order when both are needed: inbound, then outbox.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicU8, Ordering};

use bytes::{Buf, Bytes, BytesMut};
use canvas_protocol::MessageAssembler;
use mio::net::TcpStream;
use parking_lot::{Mutex, MutexGuard};

use crate::error::SessionError;
use crate::types::{ConnectionId, ConnectionState};

/// Bytes received but not yet consumed by the handshake or frame codec.
pub struct Inbound {
    buffer: BytesMut,
    capacity: usize,
    pub(crate) assembler: MessageAssembler,
    /// Buffer holds the start of a frame (or header block) whose tail
    /// has not arrived yet.
    pub(crate) partial: bool,
}

impl Inbound {
    fn new(capacity: usize) -> Self {
        Inbound {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            assembler: MessageAssembler::new(capacity),
            partial: false,
        }
    }

    /// Stage `bytes` behind anything left over from earlier reads.
    ///
    /// Overflow is an error; nothing is truncated.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        let len = self.buffer.len() + bytes.len();
        if len > self.capacity {
            return Err(SessionError::BufferOverflow {
                len,
                capacity: self.capacity,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn consume(&mut self, n: usize) {
        self.buffer.advance(n);
    }

    pub fn is_partial(&self) -> bool {
        self.partial
    }
}

#[derive(Default)]
struct Outbox {
    frames: VecDeque<Bytes>,
    queued_bytes: usize,
}

/// Result of pushing the outbox at the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Idle,
    /// Socket is full; waiting for the next writable edge.
    Pending,
    /// Everything written and the connection is closing: tear it down.
    Finished,
}

pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
    state: AtomicU8,
    inbound: Mutex<Inbound>,
    outbox: Mutex<Outbox>,
    outbox_limit: usize,
}

impl Connection {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        peer: SocketAddr,
        recv_capacity: usize,
        outbox_limit: usize,
    ) -> Self {
        Connection {
            id,
            peer,
            stream,
            state: AtomicU8::new(ConnectionState::Handshake as u8),
            inbound: Mutex::new(Inbound::new(recv_capacity)),
            outbox: Mutex::new(Outbox::default()),
            outbox_limit,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Move to `next` if it is later in the lifecycle.
    ///
    /// Returns false (and changes nothing) for backward or repeated
    /// transitions.
    pub fn advance(&self, next: ConnectionState) -> bool {
        let next = next as u8;
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                (next > cur).then_some(next)
            })
            .is_ok()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub(crate) fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub(crate) fn inbound(&self) -> MutexGuard<'_, Inbound> {
        self.inbound.lock()
    }

    /// Bytes accepted by `send` but not yet written to the socket.
    pub fn queued_bytes(&self) -> usize {
        self.outbox.lock().queued_bytes
    }

    /// Queue an encoded frame and write as much as the socket takes.
    ///
    /// Frames sent after the connection started closing are dropped.
    pub fn send(&self, bytes: Bytes) -> Result<(), SessionError> {
        if bytes.is_empty() {
            return Ok(());
        }

        let mut outbox = self.outbox.lock();
        if self.state() >= ConnectionState::Closing {
            return Ok(());
        }

        let queued = outbox.queued_bytes + bytes.len();
        if queued > self.outbox_limit {
            return Err(SessionError::SlowConsumer {
                queued,
                limit: self.outbox_limit,
            });
        }
        outbox.queued_bytes = queued;
        outbox.frames.push_back(bytes);

        self.write_pending(&mut outbox)?;
        Ok(())
    }

    pub fn flush(&self) -> Result<FlushStatus, SessionError> {
        let mut outbox = self.outbox.lock();
        self.write_pending(&mut outbox)?;

        if !outbox.frames.is_empty() {
            Ok(FlushStatus::Pending)
        } else if self.state() == ConnectionState::Closing {
            Ok(FlushStatus::Finished)
        } else {
            Ok(FlushStatus::Idle)
        }
    }

    /// Stop accepting input and close once the outbox drains.
    ///
    /// Returns true when nothing is left to write, i.e. the caller should
    /// tear the connection down now. Otherwise the writable edge that
    /// empties the outbox reports `FlushStatus::Finished`.
    pub fn close_after_flush(&self) -> bool {
        let outbox = self.outbox.lock();
        self.advance(ConnectionState::Closing);
        outbox.frames.is_empty()
    }

    /// Final state change and socket shutdown. Only the registry calls this.
    pub(crate) fn shutdown(&self) {
        self.advance(ConnectionState::Closed);
        // Already-reset sockets report NotConnected; nothing left to do.
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn write_pending(&self, outbox: &mut Outbox) -> io::Result<()> {
        while let Some(front) = outbox.frames.front_mut() {
            match (&self.stream).write(&front[..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) if n < front.len() => {
                    front.advance(n);
                    outbox.queued_bytes -= n;
                }
                Ok(n) => {
                    outbox.queued_bytes -= n;
                    outbox.frames.pop_front();
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream as StdStream};

    fn pair(recv: usize, outbox: usize) -> (Connection, StdStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = StdStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();

        let conn = Connection::new(
            ConnectionId(1),
            TcpStream::from_std(server),
            peer,
            recv,
            outbox,
        );
        (conn, client)
    }

    #[test]
    fn state_only_moves_forward() {
        let (conn, _client) = pair(1024, 1024);
        assert_eq!(conn.state(), ConnectionState::Handshake);

        assert!(conn.advance(ConnectionState::Open));
        assert!(!conn.advance(ConnectionState::Open));
        assert!(!conn.advance(ConnectionState::Handshake));
        assert!(conn.advance(ConnectionState::Closed));
        assert!(!conn.advance(ConnectionState::Closing));
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn inbound_overflow_is_an_error() {
        let (conn, _client) = pair(8, 1024);
        let mut inbound = conn.inbound();

        inbound.append(&[0; 6]).unwrap();
        let err = inbound.append(&[0; 3]).unwrap_err();
        assert!(matches!(
            err,
            SessionError::BufferOverflow { len: 9, capacity: 8 }
        ));
        // Nothing was truncated into the buffer.
        assert_eq!(inbound.buffer().len(), 6);

        inbound.consume(4);
        inbound.append(&[0; 6]).unwrap();
        assert_eq!(inbound.buffer().len(), 8);
    }

    #[test]
    fn unread_peer_becomes_a_slow_consumer() {
        let (conn, _client) = pair(1024, 64 * 1024);
        let chunk = Bytes::from(vec![0u8; 32 * 1024]);

        let mut failed = None;
        for _ in 0..4096 {
            if let Err(e) = conn.send(chunk.clone()) {
                failed = Some(e);
                break;
            }
        }

        assert!(matches!(failed, Some(SessionError::SlowConsumer { .. })));
        assert!(conn.queued_bytes() <= 64 * 1024);
    }

    #[test]
    fn closing_drops_later_frames() {
        let (conn, _client) = pair(1024, 1024);
        conn.advance(ConnectionState::Open);

        conn.send(Bytes::from_static(b"bye")).unwrap();
        assert!(conn.close_after_flush());
        assert_eq!(conn.state(), ConnectionState::Closing);

        conn.send(Bytes::from_static(b"late")).unwrap();
        assert_eq!(conn.queued_bytes(), 0);
        assert_eq!(conn.flush().unwrap(), FlushStatus::Finished);
    }
}
