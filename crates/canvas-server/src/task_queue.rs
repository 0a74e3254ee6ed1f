//! Bounded blocking task queue.
//!
//! Fixed-capacity ring buffer shared by producers (reactor, tickers) and
//! one consuming worker thread. `push` never blocks: a full queue hands
//! the task back so the producer can apply its own rejection policy.
//! `pop` blocks until a task arrives or the queue is closed and empty.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Rejected push. The task is returned to the caller.
#[derive(Debug, Error)]
pub enum QueueError<T> {
    #[error("task queue is full")]
    Full(T),

    #[error("task queue is closed")]
    Closed(T),
}

impl<T> QueueError<T> {
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Full(t) | QueueError::Closed(t) => t,
        }
    }
}

struct Ring<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct TaskQueue<T> {
    ring: Mutex<Ring<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> TaskQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        TaskQueue {
            ring: Mutex::new(Ring {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue without blocking.
    pub fn push(&self, item: T) -> Result<(), QueueError<T>> {
        let mut ring = self.ring.lock();
        if ring.closed {
            return Err(QueueError::Closed(item));
        }
        if ring.items.len() >= self.capacity {
            return Err(QueueError::Full(item));
        }
        ring.items.push_back(item);
        drop(ring);

        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available.
    ///
    /// Returns `None` once the queue is closed and every queued item has
    /// been handed out.
    pub fn pop(&self) -> Option<T> {
        let mut ring = self.ring.lock();
        loop {
            if let Some(item) = ring.items.pop_front() {
                return Some(item);
            }
            if ring.closed {
                return None;
            }
            self.available.wait(&mut ring);
        }
    }

    /// Refuse further pushes and wake every blocked consumer.
    pub fn close(&self) {
        self.ring.lock().closed = true;
        self.available.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn full_queue_returns_the_item() {
        let q = TaskQueue::new(2);
        q.push(1).unwrap();
        q.push(2).unwrap();

        match q.push(3) {
            Err(QueueError::Full(3)) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn fifo_order() {
        let q = TaskQueue::new(8);
        for i in 0..5 {
            q.push(i).unwrap();
        }
        q.close();
        let drained: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn close_drains_then_ends() {
        let q = TaskQueue::new(4);
        q.push("a").unwrap();
        q.close();

        assert!(matches!(q.push("b"), Err(QueueError::Closed("b"))));
        assert_eq!(q.pop(), Some("a"));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn pop_blocks_until_push() {
        let q = Arc::new(TaskQueue::new(1));
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(v) = q.pop() {
                    seen.push(v);
                }
                seen
            })
        };

        for i in 0..100 {
            // Capacity 1: spin until the consumer makes room.
            let mut item = i;
            loop {
                match q.push(item) {
                    Ok(()) => break,
                    Err(e) => {
                        item = e.into_inner();
                        thread::yield_now();
                    }
                }
            }
        }
        q.close();

        assert_eq!(consumer.join().unwrap(), (0..100).collect::<Vec<_>>());
    }
}
