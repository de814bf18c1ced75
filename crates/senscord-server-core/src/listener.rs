//! Listener (spec §4.2): binds one transport, accepts connections, and hands
//! each off to a freshly spawned client adapter (primary or secondary,
//! depending on the listener's role).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use senscord_sdk::SensorCore;
use senscord_transport::{Transport, TransportError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::client_adapter::ClientAdapter;
use crate::manager::ClientAdapterManager;
use crate::secondary::SecondaryClientAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerRole {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Idle,
    Listening,
    Stopping,
}

/// Bind/listen/accept on a transport the listener constructs via
/// `transport_factory`, one boxed instance per bind attempt (spec §4.1: the
/// transport decides its own framing and connection semantics; the listener
/// is agnostic to which concrete transport it drives).
pub struct Listener {
    role: ListenerRole,
    connection_key: String,
    address: String,
    transport_factory: Box<dyn Fn() -> Box<dyn Transport> + Send + Sync>,
    manager: Arc<ClientAdapterManager>,
    core: Arc<dyn SensorCore>,
    config: Arc<senscord_config::ConfigFacade>,
    allocator_base_dir: std::path::PathBuf,
    state: Mutex<ListenerState>,
    ending: Arc<AtomicBool>,
    handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Listener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        role: ListenerRole,
        connection_key: String,
        address: String,
        transport_factory: Box<dyn Fn() -> Box<dyn Transport> + Send + Sync>,
        manager: Arc<ClientAdapterManager>,
        core: Arc<dyn SensorCore>,
        config: Arc<senscord_config::ConfigFacade>,
        allocator_base_dir: impl Into<std::path::PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            role,
            connection_key,
            address,
            transport_factory,
            manager,
            core,
            config,
            allocator_base_dir: allocator_base_dir.into(),
            state: Mutex::new(ListenerState::Idle),
            ending: Arc::new(AtomicBool::new(false)),
            handle: AsyncMutex::new(None),
        })
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().expect("listener state mutex poisoned");
            if *state != ListenerState::Idle {
                return Err(TransportError::AlreadyConnected);
            }
            *state = ListenerState::Listening;
        }

        let mut transport = (self.transport_factory)();
        transport.open(&[]).await?;
        transport.bind(&self.address).await?;
        transport.listen().await?;

        self.ending.store(false, Ordering::Release);
        let listener = self.clone();
        let handle = tokio::spawn(async move { listener.accept_loop(transport).await });
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, mut transport: Box<dyn Transport>) {
        loop {
            if self.ending.load(Ordering::Acquire) {
                break;
            }
            match transport.wait_readable(1_000_000_000).await {
                Ok(()) => {}
                Err(TransportError::Timeout) => continue,
                Err(e) => {
                    tracing::debug!(address = %self.address, error = %e, "listener accept loop ending");
                    break;
                }
            }
            match transport.accept().await {
                Ok((accepted, same_system)) => {
                    tracing::debug!(address = %self.address, same_system, "accepted connection");
                    self.spawn_adapter(accepted);
                }
                Err(e) => {
                    tracing::debug!(address = %self.address, error = %e, "listener accept loop ending");
                    break;
                }
            }
        }
        let _ = transport.close().await;
        *self.state.lock().expect("listener state mutex poisoned") = ListenerState::Idle;
    }

    fn spawn_adapter(&self, transport: Box<dyn Transport>) {
        let adapter_id = self.manager.next_adapter_id();
        match self.role {
            ListenerRole::Primary => {
                let adapter = ClientAdapter::new(
                    adapter_id,
                    self.connection_key.clone(),
                    transport,
                    self.core.clone(),
                    self.config.clone(),
                    self.allocator_base_dir.clone(),
                    self.manager.retire_handle(),
                );
                self.manager.register(adapter.clone());
                adapter.spawn_receive_loop();
            }
            ListenerRole::Secondary => {
                let adapter = SecondaryClientAdapter::new(adapter_id, transport, self.manager.clone());
                self.manager.register(adapter.clone());
                adapter.spawn_receive_loop();
            }
        }
    }

    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("listener state mutex poisoned");
            if *state == ListenerState::Idle {
                return;
            }
            *state = ListenerState::Stopping;
        }
        self.ending.store(true, Ordering::Release);
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_config::ConfigFacade;
    use senscord_sdk::mock::MockSensorCore;
    use senscord_sdk::VersionRecord;
    use senscord_transport::loopback::LoopbackTransport;
    use senscord_transport::Transport;

    fn core() -> Arc<dyn SensorCore> {
        Arc::new(MockSensorCore::new(
            VersionRecord {
                name: "mock".into(),
                major: 1,
                minor: 0,
                patch: 0,
                description: "test".into(),
                stream_versions: vec![],
            },
            vec![],
        ))
    }

    fn config() -> Arc<senscord_config::ConfigFacade> {
        Arc::new(ConfigFacade::new(senscord_config::ServerConfig {
            client_enabled: true,
            listeners: vec![],
            stream_settings: vec![],
        }))
    }

    #[tokio::test]
    async fn accepted_connection_is_handed_to_a_new_adapter() {
        let manager = ClientAdapterManager::new();
        let dir = tempfile::tempdir().unwrap();
        let listener = Listener::new(
            ListenerRole::Primary,
            "tcp_0".into(),
            "loop://listener-test".into(),
            Box::new(|| Box::new(LoopbackTransport::new()) as Box<dyn Transport>),
            manager.clone(),
            core(),
            config(),
            dir.path(),
        );
        listener.start().await.unwrap();

        let mut client = LoopbackTransport::new();
        client.connect("loop://listener-test").await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        listener.stop().await;
        manager.stop_all().await;
    }
}
