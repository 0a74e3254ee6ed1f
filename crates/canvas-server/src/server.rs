//! Listener and top-level server wiring.
//!
//! This module:
//! - Binds the listening socket and creates the readiness poller.
//! - Restores the canvas from the snapshot store, if one is configured.
//! - Spawns:
//!   - the worker pool (plain threads),
//!   - the reactor thread,
//!   - the broadcast and snapshot tickers (tokio tasks).
//!
//! Per-connection logic lives in `client`, the event loop in `reactor`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use canvas_core::{Canvas, DEFAULT_COLOR};
use canvas_protocol::binary_codec::SNAPSHOT_HEADER_LEN;
use canvas_protocol::frame::header_len;
use mio::Poll;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::canvas_store::CanvasStore;
use crate::canvas_task;
use crate::config::Config;
use crate::persistence::{JsonFileStore, SnapshotStore};
use crate::reactor::{Reactor, ReactorHandle};
use crate::registry::ConnectionRegistry;
use crate::static_files::StaticFiles;
use crate::worker::{WorkerContext, WorkerPool};

/// Size of the reactor's reusable read buffer.
const READ_CHUNK: usize = 8 * 1024;

/// Outbox headroom on top of the initial snapshot frame.
const OUTBOX_HEADROOM: usize = 64 * 1024;

pub struct Server;

/// A running server. Dropping it without `shutdown` leaves the threads
/// running until the process exits.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    canvas: Arc<CanvasStore>,
    pool: Arc<WorkerPool>,
    reactor: ReactorHandle,
    tickers: Vec<JoinHandle<()>>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl Server {
    /// Bind and start everything. Must be called inside a tokio runtime.
    pub async fn start(config: Config) -> anyhow::Result<ServerHandle> {
        config.validate()?;

        let addr = config.socket_addr_string();
        let std_listener = std::net::TcpListener::bind(&addr)
            .with_context(|| format!("failed to bind {addr}"))?;
        std_listener
            .set_nonblocking(true)
            .context("failed to make listener non-blocking")?;
        let listener = mio::net::TcpListener::from_std(std_listener);

        let poll = Poll::new().context("failed to create readiness poller")?;
        let poll_registry = poll
            .registry()
            .try_clone()
            .context("failed to clone poll registry")?;
        let registry = Arc::new(ConnectionRegistry::new(poll_registry, config.max_clients));

        let store: Option<Arc<dyn SnapshotStore>> = config
            .snapshot_path
            .as_ref()
            .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn SnapshotStore>);
        let canvas = Arc::new(CanvasStore::new(load_canvas(&config, store.as_deref())?));

        let ctx = Arc::new(WorkerContext {
            registry: Arc::clone(&registry),
            canvas: Arc::clone(&canvas),
            static_files: config.static_dir.as_ref().map(StaticFiles::new),
            recv_buffer_bytes: config.recv_buffer_bytes,
            outbox_limit: outbox_limit(&config),
        });
        let pool = Arc::new(
            WorkerPool::start(config.workers, config.queue_capacity, ctx)
                .context("failed to spawn workers")?,
        );

        let started = Reactor::new(
            poll,
            listener,
            Arc::clone(&registry),
            Arc::clone(&pool),
            READ_CHUNK,
        )
        .and_then(|reactor| {
            let local_addr = reactor.local_addr()?;
            Ok((local_addr, reactor.spawn()?))
        });
        let (local_addr, reactor) = match started {
            Ok(started) => started,
            Err(e) => {
                pool.shutdown();
                return Err(e).context("failed to start reactor");
            }
        };

        let mut tickers = vec![tokio::spawn(canvas_task::run_broadcast_loop(
            Arc::clone(&canvas),
            Arc::clone(&registry),
            Arc::clone(&pool),
            config.broadcast_interval,
        ))];
        if let Some(store) = &store {
            tickers.push(tokio::spawn(canvas_task::run_snapshot_loop(
                Arc::clone(&canvas),
                Arc::clone(store),
                config.snapshot_interval,
            )));
        }

        info!(
            "listening on {} ({}x{} canvas, {} workers, max_clients = {})",
            local_addr,
            config.canvas_width,
            config.canvas_height,
            pool.lanes(),
            config.max_clients
        );

        Ok(ServerHandle {
            local_addr,
            registry,
            canvas,
            pool,
            reactor,
            tickers,
            store,
        })
    }
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Connections that completed the handshake and are still open.
    pub fn connection_count(&self) -> usize {
        self.registry.open_count()
    }

    pub fn canvas(&self) -> Arc<CanvasStore> {
        Arc::clone(&self.canvas)
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Stop tickers, stop the reactor, drain and join the workers,
    /// close remaining connections, then write a final snapshot.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let ServerHandle {
            registry,
            canvas,
            pool,
            reactor,
            tickers,
            store,
            ..
        } = self;

        for ticker in &tickers {
            ticker.abort();
        }

        tokio::task::spawn_blocking(move || {
            reactor.stop();
            pool.shutdown();
            registry.teardown_all("server shutting down")
        })
        .await
        .context("shutdown task failed")?;

        if let Some(store) = store {
            canvas_task::save_snapshot(canvas, store)
                .await
                .context("final snapshot failed")?;
        }

        info!("server stopped");
        Ok(())
    }
}

/// Run until Ctrl-C, then shut down gracefully.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = Server::start(config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");

    server.shutdown().await
}

/// Restore from the snapshot store, or start blank.
///
/// A snapshot with other dimensions than configured is ignored.
fn load_canvas(config: &Config, store: Option<&dyn SnapshotStore>) -> anyhow::Result<Canvas> {
    let (width, height) = (config.canvas_width, config.canvas_height);
    let blank = || Canvas::new(width, height, DEFAULT_COLOR).context("invalid canvas size");

    let Some(store) = store else {
        return blank();
    };

    match store.load() {
        Ok(Some(snapshot)) if snapshot.width == width && snapshot.height == height => {
            info!("restored {}x{} canvas from snapshot", width, height);
            Canvas::from_snapshot(snapshot).context("snapshot rejected")
        }
        Ok(Some(snapshot)) => {
            warn!(
                "snapshot is {}x{} but canvas is configured {}x{}; starting blank",
                snapshot.width, snapshot.height, width, height
            );
            blank()
        }
        Ok(None) => {
            info!("no snapshot found; starting blank");
            blank()
        }
        Err(e) => {
            warn!("could not load snapshot ({}); starting blank", e);
            blank()
        }
    }
}

fn outbox_limit(config: &Config) -> usize {
    let snapshot_payload =
        SNAPSHOT_HEADER_LEN + config.canvas_width as usize * config.canvas_height as usize;
    let snapshot_frame = header_len(snapshot_payload, false) + snapshot_payload;
    config
        .max_outbox_bytes
        .max(snapshot_frame + OUTBOX_HEADROOM)
}
