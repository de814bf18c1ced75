use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

/// Outcome of a [`BoundedDropOldest::push`]: whether making room for the new
/// entry required evicting the oldest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Inserted,
    InsertedAndDroppedOldest,
}

/// A bounded FIFO that drops its oldest entry on overflow rather than
/// rejecting the new one (spec §5: `syncframe_queue`/`event_queue`). Callers
/// that need to raise a `FrameDropped` event check [`PushOutcome`].
pub struct BoundedDropOldest<T> {
    capacity: usize,
    items: Mutex<VecDeque<T>>,
    ready: Notify,
    dropped_total: AtomicU64,
}

impl<T> BoundedDropOldest<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be positive");
        Self {
            capacity,
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Notify::new(),
            dropped_total: AtomicU64::new(0),
        }
    }

    pub fn push(&self, item: T) -> PushOutcome {
        let mut items = self.items.lock().expect("queue mutex poisoned");
        let outcome = if items.len() >= self.capacity {
            items.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            PushOutcome::InsertedAndDroppedOldest
        } else {
            PushOutcome::Inserted
        };
        items.push_back(item);
        drop(items);
        self.ready.notify_one();
        outcome
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items.lock().expect("queue mutex poisoned").pop_front()
    }

    /// Waits until an item is available, then pops it.
    pub async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.try_pop() {
                return item;
            }
            self.ready.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("queue mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

/// Queue of buffered frames awaiting an embedding application's consumption.
pub type SyncFrameQueue<T> = BoundedDropOldest<T>;
/// Queue of buffered events awaiting an embedding application's consumption.
pub type SyncEventQueue<T> = BoundedDropOldest<T>;
