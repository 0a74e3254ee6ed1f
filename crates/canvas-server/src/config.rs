//! Configuration for the canvas server.
//!
//! Defaults can be overridden via environment variables, and the binary
//! lets CLI flags override both:
//!
//! - `CANVAS_BIND_ADDR`       (default: "0.0.0.0")
//! - `CANVAS_PORT`            (default: "8080")
//! - `CANVAS_MAX_CLIENTS`     (default: "10000")
//! - `CANVAS_WIDTH`           (default: "500")
//! - `CANVAS_HEIGHT`          (default: "500")
//! - `CANVAS_WORKERS`         (default: "4")
//! - `CANVAS_QUEUE_CAPACITY`  (default: "2048", per worker lane)
//! - `CANVAS_RECV_BUFFER`     (default: "65536")
//! - `CANVAS_MAX_OUTBOX`      (default: "4194304")
//! - `CANVAS_BROADCAST_MS`    (default: "500")
//! - `CANVAS_SNAPSHOT_SECS`   (default: "60")
//! - `CANVAS_SNAPSHOT_PATH`   (default: "canvas_snapshot.json", empty disables)
//! - `CANVAS_STATIC_DIR`      (default: unset, no static files)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{ensure, Context};

#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on. `0` picks an ephemeral port.
    pub port: u16,

    pub max_clients: usize,

    pub canvas_width: u16,
    pub canvas_height: u16,

    /// Worker threads; each owns one task queue lane.
    pub workers: usize,

    /// Capacity of each worker's task queue.
    pub queue_capacity: usize,

    /// Per-connection receive staging buffer. Also bounds a reassembled
    /// message.
    pub recv_buffer_bytes: usize,

    /// Unsent bytes allowed per connection before it is dropped as a
    /// slow consumer. Raised automatically to fit the initial snapshot.
    pub max_outbox_bytes: usize,

    pub broadcast_interval: Duration,

    /// Snapshot cadence (only written when the canvas changed).
    pub snapshot_interval: Duration,

    /// Where snapshots are loaded from and saved to. `None` disables
    /// persistence.
    pub snapshot_path: Option<PathBuf>,

    /// Serve plain HTTP requests from this directory.
    pub static_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            max_clients: 10_000,
            canvas_width: 500,
            canvas_height: 500,
            workers: 4,
            queue_capacity: 2048,
            recv_buffer_bytes: 64 * 1024,
            max_outbox_bytes: 4 * 1024 * 1024,
            broadcast_interval: Duration::from_millis(500),
            snapshot_interval: Duration::from_secs(60),
            snapshot_path: None,
            static_dir: None,
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to the defaults above.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        let bind_addr = env::var("CANVAS_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_env_or_default("CANVAS_PORT", defaults.port)?;
        let max_clients = read_env_or_default("CANVAS_MAX_CLIENTS", defaults.max_clients)?;
        let canvas_width = read_env_or_default("CANVAS_WIDTH", defaults.canvas_width)?;
        let canvas_height = read_env_or_default("CANVAS_HEIGHT", defaults.canvas_height)?;
        let workers = read_env_or_default("CANVAS_WORKERS", defaults.workers)?;
        let queue_capacity = read_env_or_default("CANVAS_QUEUE_CAPACITY", defaults.queue_capacity)?;
        let recv_buffer_bytes = read_env_or_default("CANVAS_RECV_BUFFER", defaults.recv_buffer_bytes)?;
        let max_outbox_bytes = read_env_or_default("CANVAS_MAX_OUTBOX", defaults.max_outbox_bytes)?;
        let broadcast_ms = read_env_or_default("CANVAS_BROADCAST_MS", 500u64)?;
        let snapshot_secs = read_env_or_default("CANVAS_SNAPSHOT_SECS", 60u64)?;

        let snapshot_path = match env::var("CANVAS_SNAPSHOT_PATH") {
            Ok(p) if p.is_empty() => None,
            Ok(p) => Some(PathBuf::from(p)),
            Err(_) => Some(PathBuf::from("canvas_snapshot.json")),
        };
        let static_dir = env::var("CANVAS_STATIC_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .map(PathBuf::from);

        let config = Config {
            bind_addr,
            port,
            max_clients,
            canvas_width,
            canvas_height,
            workers,
            queue_capacity,
            recv_buffer_bytes,
            max_outbox_bytes,
            broadcast_interval: Duration::from_millis(broadcast_ms),
            snapshot_interval: Duration::from_secs(snapshot_secs),
            snapshot_path,
            static_dir,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.canvas_width > 0 && self.canvas_height > 0, "canvas must not be empty");
        ensure!(self.workers > 0, "at least one worker is required");
        ensure!(self.queue_capacity > 0, "queue capacity must be positive");
        ensure!(self.max_clients > 0, "max_clients must be positive");
        ensure!(
            self.recv_buffer_bytes >= 1024,
            "receive buffer must hold at least 1024 bytes (got {})",
            self.recv_buffer_bytes
        );
        ensure!(!self.broadcast_interval.is_zero(), "broadcast interval must be positive");
        ensure!(!self.snapshot_interval.is_zero(), "snapshot interval must be positive");
        Ok(())
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {val:?}")),
        Err(_) => Ok(default),
    }
}
