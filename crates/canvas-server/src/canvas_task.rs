//! Periodic canvas work on the tokio runtime.
//!
//! - Broadcast ticker: drains the dirty set on a fixed cadence and hands
//!   one JSON delta per tick to the worker pool. Edit bursts between two
//!   ticks coalesce into one message.
//! - Snapshot ticker: writes the grid to the snapshot store when it has
//!   changed since the last successful save.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use canvas_protocol::json_codec::encode_delta;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::canvas_store::CanvasStore;
use crate::persistence::SnapshotStore;
use crate::registry::ConnectionRegistry;
use crate::types::Task;
use crate::worker::WorkerPool;

pub(crate) async fn run_broadcast_loop(
    canvas: Arc<CanvasStore>,
    registry: Arc<ConnectionRegistry>,
    pool: Arc<WorkerPool>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        broadcast_once(&canvas, &registry, &pool);
    }
}

/// Drain, encode and schedule one delta. Returns the number of updates
/// handed to the pool.
///
/// If the delta cannot be scheduled the updates go back into the dirty
/// set for the next tick.
pub(crate) fn broadcast_once(
    canvas: &CanvasStore,
    registry: &ConnectionRegistry,
    pool: &WorkerPool,
) -> usize {
    let updates = canvas.drain_dirty();
    if updates.is_empty() {
        return 0;
    }

    let client_count = registry.open_count();
    let payload = match encode_delta(client_count, &updates) {
        Ok(payload) => payload,
        Err(e) => {
            error!("failed to encode delta: {}", e);
            canvas.restore_dirty(updates);
            return 0;
        }
    };

    let count = updates.len();
    match pool.submit(Task::Broadcast {
        payload: Bytes::from(payload),
    }) {
        Ok(()) => {
            debug!("scheduled delta of {} updates for {} clients", count, client_count);
            count
        }
        Err(e) => {
            warn!("delta not scheduled ({}), deferring {} updates", e, count);
            canvas.restore_dirty(updates);
            0
        }
    }
}

pub(crate) async fn run_snapshot_loop(
    canvas: Arc<CanvasStore>,
    store: Arc<dyn SnapshotStore>,
    period: Duration,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick fires immediately; nothing has changed yet.
    ticker.tick().await;

    let mut saved_version = canvas.version();
    loop {
        ticker.tick().await;

        let version = canvas.version();
        if version == saved_version {
            continue;
        }

        match save_snapshot(Arc::clone(&canvas), Arc::clone(&store)).await {
            Ok(()) => {
                debug!("snapshot saved at version {}", version);
                saved_version = version;
            }
            Err(e) => error!("snapshot save failed: {:#}", e),
        }
    }
}

/// Copy the grid and write it on the blocking pool.
pub(crate) async fn save_snapshot(
    canvas: Arc<CanvasStore>,
    store: Arc<dyn SnapshotStore>,
) -> anyhow::Result<()> {
    let snapshot = canvas.snapshot();
    let cells = snapshot.pixels.len();

    tokio::task::spawn_blocking(move || store.save(&snapshot))
        .await
        .context("snapshot task failed")??;

    info!("snapshot written ({} cells)", cells);
    Ok(())
}
