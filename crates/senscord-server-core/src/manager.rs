//! Client adapter manager (spec §4.3): owns the set of live client adapters
//! (primary and secondary alike) and reaps them off a deferred-release queue
//! once their receive loop has exited.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use senscord_proto::Message;
use senscord_transport::TransportError;
use tokio::sync::mpsc;

use crate::ids::IdAllocator;

/// What a client adapter (primary or secondary) offers the manager: an
/// identity to reap by, an optional secondary-attach handshake, and a way to
/// stop it from the outside (spec §9: "the worker holds a non-owning
/// back-reference to the manager" — the inverse direction, the manager's
/// hold on the adapter, is this trait).
#[async_trait]
pub trait ManagedAdapter: Send + Sync {
    fn adapter_id(&self) -> u64;

    /// Attaches `sink` as this adapter's secondary egress if it owns
    /// `stream_id`. Returns whether it did.
    async fn try_attach_secondary(&self, _stream_id: u64, _sink: Arc<dyn FrameSink>) -> bool {
        false
    }

    /// Clears a previously attached secondary. Called by the secondary
    /// adapter itself when its receive loop exits.
    async fn detach_secondary(&self) {}

    async fn stop(&self);
}

/// The capability a secondary connection offers a primary: somewhere to
/// send frame-egress messages (spec §4.4 "Outbound fan-in").
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame_message(&self, msg: Message) -> Result<(), TransportError>;
}

pub struct ClientAdapterManager {
    live: Mutex<Vec<Arc<dyn ManagedAdapter>>>,
    ids: IdAllocator,
    retire_tx: mpsc::UnboundedSender<u64>,
}

impl ClientAdapterManager {
    pub fn new() -> Arc<Self> {
        let (retire_tx, retire_rx) = mpsc::unbounded_channel();
        let manager = Arc::new(Self {
            live: Mutex::new(Vec::new()),
            ids: IdAllocator::new(),
            retire_tx,
        });
        tokio::spawn(reaper_loop(manager.clone(), retire_rx));
        manager
    }

    pub fn next_adapter_id(&self) -> u64 {
        self.ids.next()
    }

    pub fn retire_handle(&self) -> mpsc::UnboundedSender<u64> {
        self.retire_tx.clone()
    }

    pub fn register(&self, adapter: Arc<dyn ManagedAdapter>) {
        self.live.lock().expect("live-adapter mutex poisoned").push(adapter);
    }

    /// Iterates the live set asking each adapter to attach `sink` as the
    /// secondary for `stream_id`. First success wins.
    pub async fn set_secondary_adapter(
        &self,
        stream_id: u64,
        sink: Arc<dyn FrameSink>,
    ) -> Option<Arc<dyn ManagedAdapter>> {
        let live: Vec<_> = self.live.lock().expect("live-adapter mutex poisoned").clone();
        for adapter in live {
            if adapter.try_attach_secondary(stream_id, sink.clone()).await {
                return Some(adapter);
            }
        }
        None
    }

    /// Stops every live adapter in reverse-insertion order, then drains
    /// whatever the reaper has not yet picked up.
    pub async fn stop_all(&self) {
        let mut adapters: Vec<_> = {
            let mut live = self.live.lock().expect("live-adapter mutex poisoned");
            live.drain(..).collect()
        };
        adapters.reverse();
        for adapter in adapters {
            adapter.stop().await;
        }
    }
}

async fn reaper_loop(manager: Arc<ClientAdapterManager>, mut retire_rx: mpsc::UnboundedReceiver<u64>) {
    while let Some(adapter_id) = retire_rx.recv().await {
        let removed = {
            let mut live = manager.live.lock().expect("live-adapter mutex poisoned");
            live.iter()
                .position(|a| a.adapter_id() == adapter_id)
                .map(|pos| live.remove(pos))
        };
        if let Some(adapter) = removed {
            adapter.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct StubAdapter {
        id: u64,
        stopped: Arc<AtomicBool>,
        owns: u64,
    }

    #[async_trait]
    impl ManagedAdapter for StubAdapter {
        fn adapter_id(&self) -> u64 {
            self.id
        }

        async fn try_attach_secondary(&self, stream_id: u64, _sink: Arc<dyn FrameSink>) -> bool {
            stream_id == self.owns
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    struct StubSink;

    #[async_trait]
    impl FrameSink for StubSink {
        async fn send_frame_message(&self, _msg: Message) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_all_stops_every_registered_adapter() {
        let manager = ClientAdapterManager::new();
        let stopped_a = Arc::new(AtomicBool::new(false));
        let stopped_b = Arc::new(AtomicBool::new(false));
        manager.register(Arc::new(StubAdapter { id: 1, stopped: stopped_a.clone(), owns: 10 }));
        manager.register(Arc::new(StubAdapter { id: 2, stopped: stopped_b.clone(), owns: 20 }));

        manager.stop_all().await;

        assert!(stopped_a.load(Ordering::SeqCst));
        assert!(stopped_b.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn set_secondary_adapter_picks_the_owning_adapter() {
        let manager = ClientAdapterManager::new();
        manager.register(Arc::new(StubAdapter {
            id: 1,
            stopped: Arc::new(AtomicBool::new(false)),
            owns: 10,
        }));
        manager.register(Arc::new(StubAdapter {
            id: 2,
            stopped: Arc::new(AtomicBool::new(false)),
            owns: 20,
        }));

        let attached = manager.set_secondary_adapter(20, Arc::new(StubSink)).await;
        assert_eq!(attached.unwrap().adapter_id(), 2);

        let attached_none = manager.set_secondary_adapter(99, Arc::new(StubSink)).await;
        assert!(attached_none.is_none());
    }
}
