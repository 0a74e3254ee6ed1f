//! Readiness event loop.
//!
//! Runs on its own thread and owns the `mio::Poll` and the listening
//! socket. It never parses anything: accepted sockets and bytes read
//! are wrapped in tasks for the worker pool.
//!
//! Queue-full policy (the reactor never blocks on the pool):
//! - `NewConnection`: the socket is dropped, logged.
//! - `Data`: logged and the connection is torn down, since losing a
//!   chunk would corrupt its byte stream.
//! - `CloseConnection`: the reactor tears the connection down itself.

use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, error, info, warn};

use crate::registry::ConnectionRegistry;
use crate::task_queue::QueueError;
use crate::types::{ConnectionId, Task};
use crate::worker::WorkerPool;

pub(crate) const LISTENER: Token = Token(usize::MAX);
pub(crate) const WAKER: Token = Token(usize::MAX - 1);

const EVENT_CAPACITY: usize = 1024;

/// Counter for assigning unique `ConnectionId`s. Never reused.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_connection_id() -> ConnectionId {
    ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
}

pub(crate) struct Reactor {
    poll: Poll,
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    pool: Arc<WorkerPool>,
    shutdown: Arc<AtomicBool>,
    scratch: Vec<u8>,
}

/// Stops and joins the reactor thread.
pub(crate) struct ReactorHandle {
    waker: Waker,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Reactor {
    /// Register the listener on `poll`. The caller builds the registry
    /// from `poll.registry()` beforehand.
    pub(crate) fn new(
        poll: Poll,
        mut listener: TcpListener,
        registry: Arc<ConnectionRegistry>,
        pool: Arc<WorkerPool>,
        read_chunk: usize,
    ) -> io::Result<Self> {
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Reactor {
            poll,
            listener,
            registry,
            pool,
            shutdown: Arc::new(AtomicBool::new(false)),
            scratch: vec![0u8; read_chunk.max(1)],
        })
    }

    pub(crate) fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub(crate) fn spawn(self) -> io::Result<ReactorHandle> {
        let waker = Waker::new(self.poll.registry(), WAKER)?;
        let shutdown = Arc::clone(&self.shutdown);

        let thread = thread::Builder::new()
            .name("canvas-reactor".to_string())
            .spawn(move || self.run())?;

        Ok(ReactorHandle {
            waker,
            shutdown,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        let mut events = Events::with_capacity(EVENT_CAPACITY);
        info!("reactor running");

        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("poll failed: {}", e);
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_all(),
                    WAKER => {}
                    token => {
                        let id = ConnectionId::from_token(token);
                        if event.is_writable() {
                            self.on_writable(id);
                        }
                        if event.is_readable() || event.is_read_closed() || event.is_error() {
                            self.on_readable(id);
                        }
                    }
                }
            }
        }

        info!("reactor stopped");
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay for {}: {}", peer, e);
                    }
                    let id = next_connection_id();
                    if let Err(e) = self.pool.submit(Task::NewConnection { id, stream, peer }) {
                        warn!("dropping connection from {}: {}", peer, e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // EMFILE and friends: try again on the next edge.
                    error!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    /// Edge-triggered: read until the socket would block.
    fn on_readable(&mut self, id: ConnectionId) {
        let Some(conn) = self.registry.get(id) else {
            return;
        };

        let mut stream = conn.stream();
        loop {
            match stream.read(&mut self.scratch) {
                Ok(0) => {
                    self.submit_close(id);
                    return;
                }
                Ok(n) => {
                    let bytes = Bytes::copy_from_slice(&self.scratch[..n]);
                    if let Err(e) = self.pool.submit(Task::Data { id, bytes }) {
                        warn!("connection {}: {} read bytes not queued ({})", id, n, e);
                        self.registry.teardown(id, "task queue full");
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("connection {} read error: {}", id, e);
                    self.submit_close(id);
                    return;
                }
            }
        }
    }

    fn on_writable(&self, id: ConnectionId) {
        if let Some(conn) = self.registry.get(id) {
            self.registry.flush(&conn);
        }
    }

    fn submit_close(&self, id: ConnectionId) {
        match self.pool.submit(Task::CloseConnection { id }) {
            Ok(()) => {}
            Err(QueueError::Full(_)) | Err(QueueError::Closed(_)) => {
                self.registry.teardown(id, "peer closed the connection");
            }
        }
    }
}

impl ReactorHandle {
    /// Signal the loop and wait for the thread to exit.
    pub(crate) fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Err(e) = self.waker.wake() {
            error!("failed to wake reactor: {}", e);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("reactor thread panicked");
            }
        }
    }
}
