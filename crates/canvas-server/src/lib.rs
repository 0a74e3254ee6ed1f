//! canvas-server
//!
//! Multi-client WebSocket server for the shared pixel canvas.
//!
//! One reactor thread owns the listening socket and a `mio::Poll`. It
//! turns readiness into [`types::Task`]s that a fixed pool of worker
//! threads consume: handshake, frame decoding, canvas mutation and
//! broadcast fan-out. Periodic work (delta broadcasts, snapshots) runs
//! on the tokio runtime.

pub mod config;
pub mod error;
pub mod types;
pub mod task_queue;
pub mod canvas_store;
pub mod persistence;
pub mod static_files;
pub mod connection;
pub mod registry;
pub mod broadcast;
pub mod worker;
pub mod server;

// these are internal modules, not re-exported
mod client;
mod reactor;
mod canvas_task;

pub use config::Config;
pub use server::{run, Server, ServerHandle};
