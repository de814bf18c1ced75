//! One connection to a server: a messenger plus the per-port demux table
//! inbound `SendFrame`/`SendEvent` traffic is routed through by
//! `server_stream_id` (spec §4.10 "Port-id ↔ server-stream-id").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use senscord_proto::{DataType, Frame, Header, Message, MessageType, OpenRequest, Payload, SendEventPayload};
use senscord_transport::Transport;
use tokio::sync::mpsc;

use crate::allocator_cache::AllocatorCache;
use crate::error::ClientError;
use crate::messenger::{InboundSink, Messenger, DEFAULT_REPLY_TIMEOUT};
use crate::port::ClientPort;

struct PortInbound {
    frame_tx: mpsc::UnboundedSender<Frame>,
    event_tx: mpsc::UnboundedSender<SendEventPayload>,
}

struct PortRegistry {
    ports: Mutex<HashMap<u64, PortInbound>>,
}

impl InboundSink for PortRegistry {
    fn on_frame(&self, server_stream_id: u64, frame: Frame) {
        let ports = self.ports.lock().expect("port registry mutex poisoned");
        if let Some(port) = ports.get(&server_stream_id) {
            let _ = port.frame_tx.send(frame);
        } else {
            tracing::debug!(server_stream_id, "dropping frame for unknown port");
        }
    }

    fn on_event(&self, server_stream_id: u64, event: SendEventPayload) {
        let ports = self.ports.lock().expect("port registry mutex poisoned");
        if let Some(port) = ports.get(&server_stream_id) {
            let _ = port.event_tx.send(event);
        }
    }
}

/// One transport connection to a server, shared by every port opened over
/// it. Dropping the last [`ClientPort`] does not close the connection —
/// callers own that lifecycle explicitly via [`ClientConnection::close`].
pub struct ClientConnection {
    messenger: Arc<Messenger>,
    registry: Arc<PortRegistry>,
    allocator_base_dir: std::path::PathBuf,
    reply_timeout: Duration,
}

impl ClientConnection {
    pub fn new(transport: Box<dyn Transport>, allocator_base_dir: impl Into<std::path::PathBuf>) -> Arc<Self> {
        Self::with_reply_timeout(transport, allocator_base_dir, DEFAULT_REPLY_TIMEOUT)
    }

    pub fn with_reply_timeout(
        transport: Box<dyn Transport>,
        allocator_base_dir: impl Into<std::path::PathBuf>,
        reply_timeout: Duration,
    ) -> Arc<Self> {
        let messenger = Messenger::new(transport);
        let registry = Arc::new(PortRegistry { ports: Mutex::new(HashMap::new()) });
        messenger.set_inbound_sink(registry.clone());
        messenger.spawn_receive_loop();
        Arc::new(Self {
            messenger,
            registry,
            allocator_base_dir: allocator_base_dir.into(),
            reply_timeout,
        })
    }

    /// Opens a stream by key and returns a port bound to the resulting
    /// `server_stream_id`.
    pub async fn open_stream(
        self: &Arc<Self>,
        stream_key: &str,
        arguments: HashMap<String, String>,
    ) -> Result<Arc<ClientPort>, ClientError> {
        let request_id = self.messenger.next_request_id();
        let request = Message::new(
            Header::new(Header::GLOBAL_STREAM_ID, request_id, MessageType::Request, DataType::Open),
            Payload::OpenRequest(OpenRequest { stream_key: stream_key.to_owned(), arguments }),
        );
        let reply = self.messenger.request(request, self.reply_timeout).await?;

        let server_stream_id = reply.header.server_stream_id;
        let open_reply = match reply.payload {
            Payload::OpenReply(r) => r,
            _ => return Err(ClientError::UnexpectedReply),
        };
        if let Some(err) = ClientError::from_status(&open_reply.status) {
            return Err(err);
        }

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.registry
            .ports
            .lock()
            .expect("port registry mutex poisoned")
            .insert(server_stream_id, PortInbound { frame_tx, event_tx });

        Ok(ClientPort::new(
            server_stream_id,
            self.clone(),
            self.messenger.clone(),
            self.reply_timeout,
            AllocatorCache::new(self.allocator_base_dir.clone()),
            frame_rx,
            event_rx,
            open_reply.property_key_list,
        ))
    }

    /// Deregisters a port's inbound demux entry (called from
    /// [`ClientPort::close`]).
    pub(crate) fn forget_port(&self, server_stream_id: u64) {
        self.registry.ports.lock().expect("port registry mutex poisoned").remove(&server_stream_id);
    }

    pub async fn close(&self) {
        self.messenger.close().await;
    }
}
