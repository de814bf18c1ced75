//! Client port (spec §4.10): the local handle an embedding application
//! drives — forwards SDK-shaped operations as requests, reconstructs
//! inbound frames, and batches property updates at frame boundaries.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use senscord_proto::{
    DataType, Header, LockPropertyReply, LockPropertyRequest, Message, MessageType, Payload,
    PropertyReqReply, RegisterEventRequest, ReleaseFrameRequest, SendEventPayload, SendFrameReply,
    StandardReply, StandardRequest, UnlockPropertyRequest, UnregisterEventRequest,
};
use senscord_proto::Frame as WireFrame;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::allocator_cache::AllocatorCache;
use crate::connection::ClientConnection;
use crate::error::ClientError;
use crate::frame::{reconstruct_frame, ReconstructedFrame};
use crate::messenger::Messenger;

/// Per-port outstanding-frame tracking (spec §4.10 "Port frame manager"):
/// "tracks outstanding sequence numbers per port; stop() plus empty
/// outstanding ⇒ fire on_release_all_frames(port_id)".
struct FrameManager {
    outstanding: Mutex<std::collections::HashSet<u64>>,
    stopped: AtomicBool,
}

impl FrameManager {
    fn new() -> Self {
        Self {
            outstanding: Mutex::new(std::collections::HashSet::new()),
            stopped: AtomicBool::new(false),
        }
    }

    fn track(&self, sequence_number: u64) {
        self.outstanding.lock().expect("outstanding mutex poisoned").insert(sequence_number);
    }

    /// Untracks `sequence_number`, returning whether this was the release
    /// that emptied the set while stopped.
    fn untrack_and_check_drained(&self, sequence_number: u64) -> bool {
        let mut outstanding = self.outstanding.lock().expect("outstanding mutex poisoned");
        outstanding.remove(&sequence_number);
        self.stopped.load(Ordering::Acquire) && outstanding.is_empty()
    }

    fn mark_stopped_and_check_drained(&self) -> bool {
        self.stopped.store(true, Ordering::Release);
        self.outstanding.lock().expect("outstanding mutex poisoned").is_empty()
    }
}

pub struct ClientPort {
    server_stream_id: u64,
    connection: Arc<ClientConnection>,
    messenger: Arc<Messenger>,
    reply_timeout: Duration,
    allocator_cache: AllocatorCache,
    frame_rx: AsyncMutex<mpsc::UnboundedReceiver<WireFrame>>,
    event_rx: AsyncMutex<mpsc::UnboundedReceiver<SendEventPayload>>,
    property_key_list: Vec<String>,
    frame_manager: FrameManager,
    pending_batch: AtomicU64,
}

impl ClientPort {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        server_stream_id: u64,
        connection: Arc<ClientConnection>,
        messenger: Arc<Messenger>,
        reply_timeout: Duration,
        allocator_cache: AllocatorCache,
        frame_rx: mpsc::UnboundedReceiver<WireFrame>,
        event_rx: mpsc::UnboundedReceiver<SendEventPayload>,
        property_key_list: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            server_stream_id,
            connection,
            messenger,
            reply_timeout,
            allocator_cache,
            frame_rx: AsyncMutex::new(frame_rx),
            event_rx: AsyncMutex::new(event_rx),
            property_key_list,
            frame_manager: FrameManager::new(),
            pending_batch: AtomicU64::new(0),
        })
    }

    pub fn server_stream_id(&self) -> u64 {
        self.server_stream_id
    }

    pub fn property_key_list(&self) -> &[String] {
        &self.property_key_list
    }

    async fn request(&self, data_type: DataType, payload: Payload) -> Result<Message, ClientError> {
        let request_id = self.messenger.next_request_id();
        let msg = Message::new(
            Header::new(self.server_stream_id, request_id, MessageType::Request, data_type),
            payload,
        );
        self.messenger.request(msg, self.reply_timeout).await
    }

    async fn standard_request(&self, data_type: DataType) -> Result<(), ClientError> {
        let reply = self.request(data_type, Payload::StandardRequest(StandardRequest)).await?;
        match reply.payload {
            Payload::StandardReply(StandardReply { status }) => {
                ClientError::from_status(&status).map_or(Ok(()), Err)
            }
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    pub async fn start(&self) -> Result<(), ClientError> {
        self.standard_request(DataType::Start).await
    }

    /// A disconnect here is treated as success so local resources are always
    /// released (spec §5 "Cancellation and timeouts").
    pub async fn stop(&self) -> Result<(), ClientError> {
        match self.standard_request(DataType::Stop).await {
            Err(ClientError::Disconnected) => Ok(()),
            other => other,
        }
    }

    pub async fn get_property(&self, key: &str) -> Result<Vec<u8>, ClientError> {
        let reply = self
            .request(
                DataType::GetProperty,
                Payload::PropertyReqReply(PropertyReqReply {
                    status: senscord_proto::MessageStatus::ok(),
                    key: key.to_owned(),
                    property: Vec::new(),
                }),
            )
            .await?;
        match reply.payload {
            Payload::PropertyReqReply(r) => ClientError::from_status(&r.status).map_or(Ok(r.property), Err),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    pub async fn set_property(&self, key: &str, value: Vec<u8>) -> Result<(), ClientError> {
        let reply = self
            .request(
                DataType::SetProperty,
                Payload::PropertyReqReply(PropertyReqReply {
                    status: senscord_proto::MessageStatus::ok(),
                    key: key.to_owned(),
                    property: value,
                }),
            )
            .await?;
        match reply.payload {
            Payload::StandardReply(StandardReply { status }) => {
                ClientError::from_status(&status).map_or(Ok(()), Err)
            }
            Payload::PropertyReqReply(r) => ClientError::from_status(&r.status).map_or(Ok(()), Err),
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Waits up to the command's own lock timeout plus the reply timeout
    /// (spec §4.10: "Timeouts for Lock/Unlock must include the command's
    /// internal lock timeout in the wait budget").
    pub async fn lock_properties(&self, keys: Vec<String>, timeout_msec: i32) -> Result<u64, ClientError> {
        let lock_budget = Duration::from_millis(timeout_msec.max(0) as u64);
        let request_id = self.messenger.next_request_id();
        let msg = Message::new(
            Header::new(self.server_stream_id, request_id, MessageType::Request, DataType::LockProperty),
            Payload::LockPropertyRequest(LockPropertyRequest { keys, timeout_msec }),
        );
        let reply = self.messenger.request(msg, self.reply_timeout + lock_budget).await?;
        match reply.payload {
            Payload::LockPropertyReply(LockPropertyReply { status, resource_id }) => {
                ClientError::from_status(&status).map_or(Ok(resource_id), Err)
            }
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// A disconnect here is treated as success so local resources are always
    /// released (spec §5 "Cancellation and timeouts").
    pub async fn unlock_properties(&self, resource_id: u64) -> Result<(), ClientError> {
        let reply = self
            .request(DataType::UnlockProperty, Payload::UnlockPropertyRequest(UnlockPropertyRequest { resource_id }))
            .await;
        match reply {
            Ok(Message { payload: Payload::StandardReply(StandardReply { status }), .. }) => {
                ClientError::from_status(&status).map_or(Ok(()), Err)
            }
            Ok(_) => Err(ClientError::UnexpectedReply),
            Err(ClientError::Disconnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn register_event(&self, event_type: &str) -> Result<(), ClientError> {
        let reply = self
            .request(
                DataType::RegisterEvent,
                Payload::RegisterEventRequest(RegisterEventRequest { event_type: event_type.to_owned() }),
            )
            .await?;
        match reply.payload {
            Payload::StandardReply(StandardReply { status }) => {
                ClientError::from_status(&status).map_or(Ok(()), Err)
            }
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    pub async fn unregister_event(&self, event_type: &str) -> Result<(), ClientError> {
        let reply = self
            .request(
                DataType::UnregisterEvent,
                Payload::UnregisterEventRequest(UnregisterEventRequest { event_type: event_type.to_owned() }),
            )
            .await?;
        match reply.payload {
            Payload::StandardReply(StandardReply { status }) => {
                ClientError::from_status(&status).map_or(Ok(()), Err)
            }
            _ => Err(ClientError::UnexpectedReply),
        }
    }

    /// Waits for and reconstructs the next inbound frame. Frames whose
    /// channels all arrived `AllData` are acknowledged immediately (no
    /// tracking needed); others are tracked until [`ClientPort::release_frame`]
    /// is called (spec §4.10 "Update checkpoint" governs batching above this
    /// layer — this method hands back one frame at a time in arrival order).
    pub async fn recv_frame(&self) -> Option<ReconstructedFrame> {
        let wire_frame = self.frame_rx.lock().await.recv().await?;
        let sequence_number = wire_frame.sequence_number;
        match reconstruct_frame(&self.allocator_cache, wire_frame) {
            Ok(frame) => {
                if frame.all_data {
                    self.ack_all_data(sequence_number).await;
                } else {
                    self.frame_manager.track(sequence_number);
                }
                Some(frame)
            }
            Err(e) => {
                tracing::warn!(
                    server_stream_id = self.server_stream_id,
                    sequence_number,
                    error = %e,
                    "dropping frame that failed to reconstruct"
                );
                None
            }
        }
    }

    pub async fn recv_event(&self) -> Option<SendEventPayload> {
        self.event_rx.lock().await.recv().await
    }

    async fn ack_all_data(&self, sequence_number: u64) {
        let msg = Message::new(
            Header::new(self.server_stream_id, sequence_number, MessageType::Reply, DataType::SendFrame),
            Payload::SendFrameReply(SendFrameReply { sequence_numbers: vec![sequence_number] }),
        );
        let _ = self.messenger.send_fire_and_forget(msg).await;
    }

    /// Releases a previously reconstructed, non-`all_data` frame: unmaps its
    /// memory and sends `ReleaseFrame` upstream (spec §4.10 "Outbound
    /// ReleaseFrame"). `rawdata_accessed` mirrors the local SDK's release
    /// kind. A disconnect here is treated as success so local resources are
    /// always released (spec §5 "Cancellation and timeouts").
    pub async fn release_frame(&self, frame: &ReconstructedFrame, rawdata_accessed: bool) -> Result<(), ClientError> {
        frame.unmap();
        let drained = self.frame_manager.untrack_and_check_drained(frame.sequence_number);

        let msg = Message::new(
            Header::new(self.server_stream_id, frame.sequence_number, MessageType::Request, DataType::ReleaseFrame),
            Payload::ReleaseFrameRequest(ReleaseFrameRequest { sequence_number: frame.sequence_number, rawdata_accessed }),
        );
        let result = self.messenger.request(msg, self.reply_timeout).await;

        if drained {
            self.allocator_cache.close_all();
        }

        match result {
            Ok(Message { payload: Payload::StandardReply(StandardReply { status }), .. }) => {
                ClientError::from_status(&status).map_or(Ok(()), Err)
            }
            Ok(_) => Err(ClientError::UnexpectedReply),
            Err(ClientError::Disconnected) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Marks this port stopped for the frame manager's bookkeeping. If no
    /// frames remain outstanding, tears down the allocator cache right away;
    /// otherwise the last [`ClientPort::release_frame`] call does it.
    pub async fn mark_stopped(&self) {
        if self.frame_manager.mark_stopped_and_check_drained() {
            self.allocator_cache.close_all();
        }
    }

    /// A disconnect here is treated as success so local resources are always
    /// released (spec §5 "Cancellation and timeouts").
    pub async fn close(&self) -> Result<(), ClientError> {
        let result = match self.standard_request(DataType::Close).await {
            Err(ClientError::Disconnected) => Ok(()),
            other => other,
        };
        self.connection.forget_port(self.server_stream_id);
        result
    }

    /// Folds a batch of updated property keys into a single apply point,
    /// honoring the checkpoint rule: a non-empty pending batch is flushed
    /// (returned) before a new update starts a fresh one (spec §4.10 "Update
    /// checkpoint").
    pub fn checkpoint_update(&self, frame_declares_update: bool) -> bool {
        let had_pending = self.pending_batch.load(Ordering::Acquire) > 0;
        if frame_declares_update {
            self.pending_batch.store(0, Ordering::Release);
            had_pending
        } else {
            self.pending_batch.fetch_add(1, Ordering::AcqRel);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use senscord_proto::{MessageStatus, OpenReply};
    use senscord_transport::loopback::LoopbackTransport;

    use crate::connection::ClientConnection;

    async fn connected_pair(addr: &str) -> (Box<dyn senscord_transport::Transport>, Box<dyn senscord_transport::Transport>) {
        let mut listener = LoopbackTransport::new();
        listener.bind(addr).await.unwrap();
        let accept_task = tokio::spawn(async move {
            let (server_side, _same_system) = listener.accept().await.unwrap();
            server_side
        });
        let mut client = LoopbackTransport::new();
        client.connect(addr).await.unwrap();
        let server_side = accept_task.await.unwrap();
        (Box::new(client), server_side)
    }

    async fn open_port(addr: &str) -> (Arc<ClientPort>, tokio::task::JoinHandle<()>) {
        let (client_transport, mut server_transport) = connected_pair(addr).await;
        let dir = tempfile::tempdir().unwrap();
        let connection = ClientConnection::new(client_transport, dir.path());

        let responder = tokio::spawn(async move {
            let opened = server_transport.recv().await.unwrap();
            let reply = Message::new(
                Header::new(5, opened.header.request_id, MessageType::Reply, DataType::Open),
                Payload::OpenReply(OpenReply { status: MessageStatus::ok(), property_key_list: vec![] }),
            );
            server_transport.send(&reply).await.unwrap();
            server_transport.close().await.unwrap();
        });

        let port = connection.open_stream("camera_0", HashMap::new()).await.unwrap();
        (port, responder)
    }

    #[tokio::test]
    async fn stop_treats_disconnect_as_success() {
        let (port, responder) = open_port("loop://port-stop-disconnect").await;
        responder.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(port.stop().await.is_ok());
    }

    #[tokio::test]
    async fn close_treats_disconnect_as_success() {
        let (port, responder) = open_port("loop://port-close-disconnect").await;
        responder.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(port.close().await.is_ok());
    }

    #[tokio::test]
    async fn unlock_properties_treats_disconnect_as_success() {
        let (port, responder) = open_port("loop://port-unlock-disconnect").await;
        responder.await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(port.unlock_properties(1).await.is_ok());
    }
}
