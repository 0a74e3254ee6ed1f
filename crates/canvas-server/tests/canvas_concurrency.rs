// crates/canvas-server/tests/canvas_concurrency.rs
//
// Many writers and a concurrent drainer: every update must come out of
// exactly one drain.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use canvas_core::{Canvas, PixelUpdate, DEFAULT_COLOR};
use canvas_server::canvas_store::CanvasStore;

const WRITERS: u16 = 8;
const PER_WRITER: u16 = 125;

#[test]
fn concurrent_applies_are_drained_exactly_once() {
    let store = Arc::new(CanvasStore::new(Canvas::new(40, 25, DEFAULT_COLOR).unwrap()));
    let done = Arc::new(AtomicBool::new(false));

    let drainer = {
        let store = Arc::clone(&store);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut drained = Vec::new();
            while !done.load(Ordering::Acquire) {
                drained.extend(store.drain_dirty());
                thread::yield_now();
            }
            drained.extend(store.drain_dirty());
            drained
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..PER_WRITER {
                    let cell = w * PER_WRITER + i;
                    store
                        .apply(PixelUpdate::new(cell % 40, cell / 40, (cell % 29) as u8))
                        .unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let drained = drainer.join().unwrap();

    assert_eq!(drained.len(), 1000);
    let unique: HashSet<(u16, u16)> = drained.iter().map(|u| (u.x, u.y)).collect();
    assert_eq!(unique.len(), 1000);
    assert!(store.drain_dirty().is_empty());

    for u in &drained {
        assert_eq!(store.get(u.x, u.y), Some(u.color));
    }
}

#[test]
fn failed_broadcast_defers_updates_to_the_next_drain() {
    let store = CanvasStore::new(Canvas::new(4, 4, DEFAULT_COLOR).unwrap());
    store.apply(PixelUpdate::new(1, 1, 3)).unwrap();

    let drained = store.drain_dirty();
    // A newer edit lands before the drained batch is put back.
    store.apply(PixelUpdate::new(1, 1, 4)).unwrap();
    store.restore_dirty(drained);

    assert_eq!(store.drain_dirty(), vec![PixelUpdate::new(1, 1, 4)]);
}
