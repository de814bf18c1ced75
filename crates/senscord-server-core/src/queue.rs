use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use senscord_proto::Message;
use tokio::sync::Notify;

/// A per-resource inbound FIFO (spec §4.5: Standard or LockUnlock queue).
/// Unlike `senscord-sync`'s bounded drop-oldest queue (an optional
/// embedding-application utility, never on the dispatch path) this queue is
/// unbounded and supports an explicit end-of-life drain.
pub struct ResourceQueue {
    items: Mutex<VecDeque<Message>>,
    notify: Notify,
    ending: AtomicBool,
}

impl Default for ResourceQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            ending: AtomicBool::new(false),
        }
    }

    /// Enqueues `msg`. Returns `false` (message not accepted) if the queue
    /// has already been told to end — the caller releases the message
    /// immediately in that case (spec §4.5 `push_message`).
    pub fn push(&self, msg: Message) -> bool {
        if self.ending.load(Ordering::Acquire) {
            return false;
        }
        self.items.lock().expect("queue mutex poisoned").push_back(msg);
        self.notify.notify_one();
        true
    }

    /// Waits for and pops the next message, or returns `None` once the queue
    /// has ended and drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            if let Some(msg) = self.items.lock().expect("queue mutex poisoned").pop_front() {
                return Some(msg);
            }
            if self.ending.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// Signals end-of-life: no further pushes are accepted and any worker
    /// blocked in `pop` still drains what is already queued before
    /// observing `None`.
    pub fn begin_end(&self) {
        self.ending.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Drains and returns anything left in the queue (used at teardown to
    /// release messages that arrived in the race between `begin_end` and a
    /// worker's last `pop`).
    pub fn drain(&self) -> Vec<Message> {
        self.items.lock().expect("queue mutex poisoned").drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::{DataType, Header, MessageType, Payload, StandardRequest};

    fn sample() -> Message {
        Message::new(
            Header::new(1, 1, MessageType::Request, DataType::GetProperty),
            Payload::StandardRequest(StandardRequest),
        )
    }

    #[tokio::test]
    async fn push_then_pop_round_trips() {
        let queue = ResourceQueue::new();
        assert!(queue.push(sample()));
        let popped = queue.pop().await;
        assert!(popped.is_some());
    }

    #[tokio::test]
    async fn ended_queue_rejects_new_pushes_and_drains_to_none() {
        let queue = ResourceQueue::new();
        queue.push(sample());
        queue.begin_end();
        assert!(!queue.push(sample()));
        assert!(queue.pop().await.is_some());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn pop_waits_until_a_message_arrives() {
        let queue = std::sync::Arc::new(ResourceQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(sample());
        assert!(waiter.await.unwrap().is_some());
    }
}
