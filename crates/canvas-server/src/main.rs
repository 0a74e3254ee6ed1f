//! WebSocket pixel-canvas server.

use std::path::PathBuf;

use anyhow::Context;
use canvas_server::config::Config;
use canvas_server::server;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Command-line overrides. Anything left unset comes from `CANVAS_*`
/// environment variables or the built-in defaults.
#[derive(Debug, Parser)]
#[command(name = "canvas-server", version, about = "Collaborative pixel canvas over WebSocket")]
struct Args {
    /// Interface to bind to.
    #[arg(long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long)]
    max_clients: Option<usize>,

    #[arg(long)]
    width: Option<u16>,

    #[arg(long)]
    height: Option<u16>,

    /// Worker threads (one task queue lane each).
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Delta broadcast cadence in milliseconds.
    #[arg(long)]
    broadcast_ms: Option<u64>,

    #[arg(long)]
    snapshot_secs: Option<u64>,

    #[arg(long)]
    snapshot_path: Option<PathBuf>,

    /// Disable snapshot persistence.
    #[arg(long, conflicts_with = "snapshot_path")]
    no_snapshot: bool,

    /// Serve static files from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

impl Args {
    fn apply(self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(max_clients) = self.max_clients {
            config.max_clients = max_clients;
        }
        if let Some(width) = self.width {
            config.canvas_width = width;
        }
        if let Some(height) = self.height {
            config.canvas_height = height;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(ms) = self.broadcast_ms {
            config.broadcast_interval = std::time::Duration::from_millis(ms);
        }
        if let Some(secs) = self.snapshot_secs {
            config.snapshot_interval = std::time::Duration::from_secs(secs);
        }
        if self.no_snapshot {
            config.snapshot_path = None;
        } else if let Some(path) = self.snapshot_path {
            config.snapshot_path = Some(path);
        }
        if let Some(dir) = self.static_dir {
            config.static_dir = Some(dir);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::from_env().context("invalid environment configuration")?;
    args.apply(&mut config);
    config.validate()?;

    info!(
        "starting canvas-server on {} (snapshot: {:?}, static: {:?})",
        config.socket_addr_string(),
        config.snapshot_path,
        config.static_dir
    );

    server::run(config).await
}
