//! Worker pool.
//!
//! Fixed number of lanes, each one `TaskQueue` drained by one named
//! thread. Connection tasks always go to lane `id % lanes`, so a single
//! consuming path sees one connection's bytes in arrival order.
//! Broadcasts all go to `BROADCAST_LANE`, so every client receives
//! deltas in the order they were drained.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::broadcast;
use crate::canvas_store::CanvasStore;
use crate::client;
use crate::connection::Connection;
use crate::registry::ConnectionRegistry;
use crate::static_files::StaticFiles;
use crate::task_queue::{QueueError, TaskQueue};
use crate::types::{ConnectionId, Task};

/// Everything a worker needs to execute a task.
pub struct WorkerContext {
    pub registry: Arc<ConnectionRegistry>,
    pub canvas: Arc<CanvasStore>,
    pub static_files: Option<StaticFiles>,
    pub recv_buffer_bytes: usize,
    pub outbox_limit: usize,
}

/// Lane that carries every `Task::Broadcast`.
pub const BROADCAST_LANE: usize = 0;

pub struct WorkerPool {
    lanes: Vec<Arc<TaskQueue<Task>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `workers` threads, each with a queue of `capacity` tasks.
    pub fn start(workers: usize, capacity: usize, ctx: Arc<WorkerContext>) -> io::Result<Self> {
        let workers = workers.max(1);
        let mut lanes = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers);

        for lane in 0..workers {
            let queue = Arc::new(TaskQueue::new(capacity));
            let handle = {
                let queue = Arc::clone(&queue);
                let ctx = Arc::clone(&ctx);
                thread::Builder::new()
                    .name(format!("canvas-worker-{lane}"))
                    .spawn(move || run_lane(lane, &queue, &ctx))?
            };
            lanes.push(queue);
            threads.push(handle);
        }

        Ok(WorkerPool {
            lanes,
            threads: Mutex::new(threads),
        })
    }

    pub fn lanes(&self) -> usize {
        self.lanes.len()
    }

    /// Enqueue without blocking; a full lane hands the task back.
    pub fn submit(&self, task: Task) -> Result<(), QueueError<Task>> {
        let lane = match task.connection() {
            Some(id) => lane_for(id, self.lanes.len()),
            None => BROADCAST_LANE,
        };
        self.lanes[lane].push(task)
    }

    /// Close every lane, let workers finish what is queued, join them.
    pub fn shutdown(&self) {
        let pending: usize = self.lanes.iter().map(|q| q.len()).sum();
        if pending > 0 {
            debug!("draining {} queued tasks", pending);
        }
        for lane in &self.lanes {
            lane.close();
        }

        let threads = std::mem::take(&mut *self.threads.lock());
        for handle in threads {
            let name = handle.thread().name().unwrap_or("worker").to_string();
            if handle.join().is_err() {
                error!("{} panicked", name);
            }
        }
    }
}

/// Lane that owns connection `id`.
pub fn lane_for(id: ConnectionId, lanes: usize) -> usize {
    (id.0 % lanes.max(1) as u64) as usize
}

fn run_lane(lane: usize, queue: &TaskQueue<Task>, ctx: &WorkerContext) {
    debug!("worker {} started", lane);
    while let Some(task) = queue.pop() {
        handle_task(ctx, task);
    }
    debug!("worker {} stopped", lane);
}

fn handle_task(ctx: &WorkerContext, task: Task) {
    match task {
        Task::NewConnection { id, stream, peer } => {
            let conn = Connection::new(id, stream, peer, ctx.recv_buffer_bytes, ctx.outbox_limit);
            if let Err(e) = ctx.registry.insert(conn) {
                warn!("rejecting connection {} from {}: {}", id, peer, e);
            }
        }

        Task::Data { id, bytes } => match ctx.registry.get(id) {
            Some(conn) => client::handle_data(ctx, &conn, &bytes),
            None => debug!("dropping {} bytes for closed connection {}", bytes.len(), id),
        },

        Task::CloseConnection { id } => {
            let reason = match ctx.registry.get(id) {
                Some(conn) if conn.inbound().is_partial() => "peer closed mid-message",
                _ => "peer closed the connection",
            };
            ctx.registry.teardown(id, reason);
        }

        Task::Broadcast { payload } => {
            let frame = broadcast::text_frame(&payload);
            let report = broadcast::fan_out(&ctx.registry, &frame);
            debug!(
                "broadcast {} bytes: delivered {}, dropped {}",
                payload.len(),
                report.delivered,
                report.dropped
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream as StdStream};
    use std::time::Duration;

    use bytes::Bytes;
    use canvas_core::{Canvas, DEFAULT_COLOR};
    use mio::net::TcpStream;
    use mio::Poll;

    use crate::types::ConnectionState;

    fn accepted(listener: &TcpListener, id: u64) -> (Connection, StdStream) {
        let client = StdStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let conn = Connection::new(ConnectionId(id), TcpStream::from_std(server), peer, 1024, 4096);
        (conn, client)
    }

    #[test]
    fn deltas_reach_clients_in_drain_order() {
        let poll = Poll::new().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(poll.registry().try_clone().unwrap(), 8));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();

        // #2 maps to lane 0 and is still handshaking; #3 maps to lane 1.
        let (busy, _busy_client) = accepted(&listener, 2);
        let (viewer, mut viewer_client) = accepted(&listener, 3);
        let busy = registry.insert(busy).unwrap();
        let viewer = registry.insert(viewer).unwrap();
        viewer.advance(ConnectionState::Open);

        let ctx = Arc::new(WorkerContext {
            registry: Arc::clone(&registry),
            canvas: Arc::new(CanvasStore::new(Canvas::new(4, 4, DEFAULT_COLOR).unwrap())),
            static_files: None,
            recv_buffer_bytes: 1024,
            outbox_limit: 4096,
        });
        let pool = WorkerPool::start(2, 16, ctx).unwrap();

        // Stall lane 0 on #2's inbound lock.
        let inbound = busy.inbound();
        pool.submit(Task::Data {
            id: ConnectionId(2),
            bytes: Bytes::from_static(b"GET / HTTP/1.1\r\n"),
        })
        .unwrap();
        pool.submit(Task::Broadcast {
            payload: Bytes::from_static(b"FIRST"),
        })
        .unwrap();
        pool.submit(Task::Broadcast {
            payload: Bytes::from_static(b"SECOND"),
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        drop(inbound);

        pool.shutdown();
        assert!(busy.inbound().is_partial());

        let expected = b"\x81\x05FIRST\x81\x06SECOND";
        let mut received = vec![0u8; expected.len()];
        viewer_client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        viewer_client.read_exact(&mut received).unwrap();
        assert_eq!(&received[..], &expected[..]);
    }

    #[test]
    fn connection_tasks_stick_to_one_lane() {
        for id in 0..64u64 {
            let lane = lane_for(ConnectionId(id), 4);
            assert_eq!(lane, (id % 4) as usize);
            assert_eq!(lane, lane_for(ConnectionId(id), 4));
        }
        assert_eq!(lane_for(ConnectionId(9), 1), 0);
    }
}
