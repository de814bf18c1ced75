//! Primary client adapter (spec §4.4): owns one accepted transport
//! connection, demultiplexes the request/reply/frame/event protocol, and
//! composes the resource adapters it opens on behalf of its peer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use senscord_proto::{
    Cause, Channel, DataType, Header, Message, MessageStatus, MessageType, OpenPublisherRequest,
    OpenReply, OpenRequest, Payload, RawDataInfo, ServerConfigEntry, ServerConfigReply,
    StandardReply, StreamListEntry, StreamListReply, StreamVersion, VersionInfo, VersionReply,
};
use senscord_sdk::SensorCore;
use senscord_transport::{Transport, TransportError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::error::AdapterError;
use crate::manager::{FrameSink, ManagedAdapter};
use crate::publisher_adapter::PublisherResourceAdapter;
use crate::resource::{OutboundSink, ResourceAdapter};
use crate::stream_adapter::StreamResourceAdapter;

pub struct ClientAdapter {
    adapter_id: u64,
    connection_key: String,
    transport: AsyncMutex<Box<dyn Transport>>,
    core: Arc<dyn SensorCore>,
    config: Arc<senscord_config::ConfigFacade>,
    allocator_base_dir: std::path::PathBuf,
    resources: Mutex<HashMap<u64, Arc<dyn ResourceAdapter>>>,
    secondary: Mutex<Option<Arc<dyn FrameSink>>>,
    retire_tx: mpsc::UnboundedSender<u64>,
}

impl ClientAdapter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter_id: u64,
        connection_key: String,
        transport: Box<dyn Transport>,
        core: Arc<dyn SensorCore>,
        config: Arc<senscord_config::ConfigFacade>,
        allocator_base_dir: impl Into<std::path::PathBuf>,
        retire_tx: mpsc::UnboundedSender<u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            adapter_id,
            connection_key,
            transport: AsyncMutex::new(transport),
            core,
            config,
            allocator_base_dir: allocator_base_dir.into(),
            resources: Mutex::new(HashMap::new()),
            secondary: Mutex::new(None),
            retire_tx,
        })
    }

    pub fn spawn_receive_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            self.clone().run().await;
            self.teardown().await;
            let _ = self.retire_tx.send(self.adapter_id);
        });
    }

    async fn run(self: Arc<Self>) {
        loop {
            let waited = {
                let mut transport = self.transport.lock().await;
                transport.wait_readable(1_000_000_000).await
            };
            match waited {
                Ok(()) => {}
                Err(TransportError::Timeout) => continue,
                Err(e) => {
                    tracing::debug!(adapter_id = self.adapter_id, error = %e, "receive loop ending");
                    return;
                }
            }
            let received = {
                let mut transport = self.transport.lock().await;
                transport.recv().await
            };
            match received {
                Ok(message) => self.dispatch(message).await,
                Err(e) => {
                    tracing::debug!(adapter_id = self.adapter_id, error = %e, "receive loop ending");
                    return;
                }
            }
        }
    }

    async fn dispatch(self: &Arc<Self>, message: Message) {
        let header = message.header;
        if header.r#type == MessageType::Handshake {
            return;
        }
        match header.data_type {
            DataType::Disconnect => {
                let _ = self.send_message_to_client(Message::reply_ok(&header, DataType::Disconnect)).await;
            }
            DataType::GetVersion => self.handle_get_version(header).await,
            DataType::GetStreamList => self.handle_get_stream_list(header).await,
            DataType::GetServerConfig => self.handle_get_server_config(header).await,
            DataType::Open => self.handle_open(header, message.payload).await,
            DataType::OpenPublisher => self.handle_open_publisher(header, message.payload).await,
            DataType::Close => self.handle_close(header).await,
            DataType::ClosePublisher => self.handle_close_publisher(header).await,
            _ if !header.is_global() => self.route_to_resource(header, message.payload).await,
            other => {
                tracing::warn!(adapter_id = self.adapter_id, data_type = ?other, "global message with no handler");
            }
        }
    }

    async fn handle_get_version(&self, header: Header) {
        let version = self.core.version().await;
        let reply = Message::new(
            Header::new(Header::GLOBAL_STREAM_ID, header.request_id, MessageType::Reply, DataType::GetVersion),
            Payload::VersionReply(VersionReply {
                status: MessageStatus::ok(),
                version: VersionInfo {
                    name: version.name,
                    major: version.major,
                    minor: version.minor,
                    patch: version.patch,
                    description: version.description,
                    stream_versions: version
                        .stream_versions
                        .into_iter()
                        .map(|v| StreamVersion {
                            stream_key: v.stream_key,
                            major: v.major,
                            minor: v.minor,
                            patch: v.patch,
                            description: v.description,
                        })
                        .collect(),
                },
            }),
        );
        let _ = self.send_message_to_client(reply).await;
    }

    async fn handle_get_stream_list(&self, header: Header) {
        let streams = self.core.stream_list().await;
        let reply = Message::new(
            Header::new(Header::GLOBAL_STREAM_ID, header.request_id, MessageType::Reply, DataType::GetStreamList),
            Payload::StreamListReply(StreamListReply {
                status: MessageStatus::ok(),
                stream_list: streams
                    .into_iter()
                    .map(|e| StreamListEntry { key: e.key, r#type: e.r#type })
                    .collect(),
            }),
        );
        let _ = self.send_message_to_client(reply).await;
    }

    async fn handle_get_server_config(&self, header: Header) {
        let config = self.core.server_config().await;
        let (status, entries) = match config {
            Some(entries) => (
                MessageStatus::ok(),
                entries.into_iter().map(|(key, value)| ServerConfigEntry { key, value }).collect(),
            ),
            None => (
                MessageStatus::error(Cause::NotSupported, "client_adapter", "server config not compiled in"),
                Vec::new(),
            ),
        };
        let reply = Message::new(
            Header::new(Header::GLOBAL_STREAM_ID, header.request_id, MessageType::Reply, DataType::GetServerConfig),
            Payload::ServerConfigReply(ServerConfigReply { status, entries }),
        );
        let _ = self.send_message_to_client(reply).await;
    }

    async fn handle_open(self: &Arc<Self>, header: Header, payload: Payload) {
        let Payload::OpenRequest(OpenRequest { stream_key, arguments }) = payload else {
            tracing::warn!(adapter_id = self.adapter_id, "Open message with mismatched payload");
            return;
        };

        let setting = self.config.stream_setting_for(&stream_key, &self.connection_key);
        tracing::debug!(
            stream_key = %stream_key,
            buffer_num = setting.buffer_num,
            "resolved stream setting for open"
        );

        match self.core.open_stream(&stream_key, &arguments).await {
            Ok(stream) => {
                let resource_id = stream.resource_id();
                let property_key_list = stream.property_keys().await;
                let adapter = StreamResourceAdapter::new(resource_id, stream);
                let outbound: Arc<dyn OutboundSink> = self.clone();
                adapter.clone().start_monitoring(outbound).await;
                self.resources
                    .lock()
                    .expect("resource table mutex poisoned")
                    .insert(resource_id, adapter as Arc<dyn ResourceAdapter>);

                let reply = Message::new(
                    Header::new(resource_id, header.request_id, MessageType::Reply, DataType::Open),
                    Payload::OpenReply(OpenReply { status: MessageStatus::ok(), property_key_list }),
                );
                let _ = self.send_message_to_client(reply).await;
            }
            Err(e) => {
                let status = MessageStatus::error(crate::error::sdk_cause(&e), "client_adapter", e.to_string());
                let reply = Message::new(
                    Header::new(Header::GLOBAL_STREAM_ID, header.request_id, MessageType::Reply, DataType::Open),
                    Payload::OpenReply(OpenReply { status, property_key_list: Vec::new() }),
                );
                let _ = self.send_message_to_client(reply).await;
            }
        }
    }

    async fn handle_open_publisher(self: &Arc<Self>, header: Header, payload: Payload) {
        let Payload::OpenPublisherRequest(OpenPublisherRequest { key }) = payload else {
            tracing::warn!(adapter_id = self.adapter_id, "OpenPublisher message with mismatched payload");
            return;
        };

        match self.core.open_publisher(&key).await {
            Ok(publisher) => {
                let resource_id = publisher.resource_id();
                let adapter = PublisherResourceAdapter::new(resource_id, publisher, self.allocator_base_dir.clone());
                let outbound: Arc<dyn OutboundSink> = self.clone();
                adapter.clone().start_monitoring(outbound).await;
                self.resources
                    .lock()
                    .expect("resource table mutex poisoned")
                    .insert(resource_id, adapter as Arc<dyn ResourceAdapter>);

                let reply = Message::new(
                    Header::new(resource_id, header.request_id, MessageType::Reply, DataType::OpenPublisher),
                    Payload::StandardReply(StandardReply { status: MessageStatus::ok() }),
                );
                let _ = self.send_message_to_client(reply).await;
            }
            Err(e) => {
                let status = MessageStatus::error(crate::error::sdk_cause(&e), "client_adapter", e.to_string());
                let _ = self
                    .send_message_to_client(Message::reply_error(&header, DataType::OpenPublisher, status))
                    .await;
            }
        }
    }

    async fn handle_close(self: &Arc<Self>, header: Header) {
        self.close_resource(header, DataType::Close).await;
    }

    async fn handle_close_publisher(self: &Arc<Self>, header: Header) {
        self.close_resource(header, DataType::ClosePublisher).await;
    }

    async fn close_resource(self: &Arc<Self>, header: Header, data_type: DataType) {
        let resource_id = header.server_stream_id;
        let adapter = self
            .resources
            .lock()
            .expect("resource table mutex poisoned")
            .get(&resource_id)
            .cloned();

        let Some(adapter) = adapter else {
            let status = MessageStatus::error(Cause::NotFound, "client_adapter", "unknown resource id");
            let _ = self.send_message_to_client(Message::reply_error(&header, data_type, status)).await;
            return;
        };

        adapter.stop_monitoring().await;
        match adapter.close(self.core.as_ref()).await {
            Ok(()) => {
                self.resources.lock().expect("resource table mutex poisoned").remove(&resource_id);
                let _ = self.send_message_to_client(Message::reply_ok(&header, data_type)).await;
            }
            Err(e) => {
                // Spec §4.4: on close failure, restart monitoring so the
                // resource stays usable.
                let outbound: Arc<dyn OutboundSink> = self.clone();
                adapter.clone().start_monitoring(outbound).await;
                let status = MessageStatus::error(e.cause(), "client_adapter", e.to_string());
                let _ = self.send_message_to_client(Message::reply_error(&header, data_type, status)).await;
            }
        }
    }

    async fn route_to_resource(&self, header: Header, payload: Payload) {
        let adapter = self
            .resources
            .lock()
            .expect("resource table mutex poisoned")
            .get(&header.server_stream_id)
            .cloned();
        match adapter {
            Some(adapter) => adapter.push_message(Message::new(header, payload)).await,
            None => {
                let status = MessageStatus::error(Cause::NotFound, "client_adapter", "unknown resource id");
                let _ = self
                    .send_message_to_client(Message::reply_error(&header, header.data_type, status))
                    .await;
            }
        }
    }

    /// Disconnect teardown (spec §4.4): clear the secondary slot, then close
    /// every still-owned resource.
    async fn teardown(&self) {
        *self.secondary.lock().expect("secondary mutex poisoned") = None;
        let resources: Vec<Arc<dyn ResourceAdapter>> = {
            let mut table = self.resources.lock().expect("resource table mutex poisoned");
            table.drain().map(|(_, v)| v).collect()
        };
        for adapter in resources {
            adapter.stop_monitoring().await;
            if let Err(e) = adapter.close(self.core.as_ref()).await {
                tracing::warn!(
                    adapter_id = self.adapter_id,
                    resource_id = adapter.resource_id(),
                    error = %e,
                    "failed to close resource during client teardown"
                );
            }
        }
    }
}

#[async_trait]
impl OutboundSink for ClientAdapter {
    async fn send_message_to_client(&self, msg: Message) -> Result<(), TransportError> {
        if msg.header.r#type == MessageType::SendFrame {
            let secondary = self.secondary.lock().expect("secondary mutex poisoned").clone();
            if let Some(sink) = secondary {
                match sink.send_frame_message(msg.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(adapter_id = self.adapter_id, error = %e, "secondary send failed, falling back to primary");
                    }
                }
            }
        }
        self.transport.lock().await.send(&msg).await
    }

    fn raw_data_for_channel(&self, channel_hint: &Channel, bytes: Vec<u8>) -> RawDataInfo {
        // get_channel_raw_data only needs `&self` on the transport, but our
        // transport is behind an async mutex (send/recv need `&mut self`).
        // A contended try_lock just falls back to inline delivery for this
        // one channel rather than blocking the caller's async context.
        match self.transport.try_lock() {
            Ok(transport) => transport.get_channel_raw_data(channel_hint, bytes),
            Err(_) => RawDataInfo::AllData(bytes),
        }
    }
}

#[async_trait]
impl ManagedAdapter for ClientAdapter {
    fn adapter_id(&self) -> u64 {
        self.adapter_id
    }

    async fn try_attach_secondary(&self, stream_id: u64, sink: Arc<dyn FrameSink>) -> bool {
        let owns = self.resources.lock().expect("resource table mutex poisoned").contains_key(&stream_id);
        if owns {
            *self.secondary.lock().expect("secondary mutex poisoned") = Some(sink);
        }
        owns
    }

    async fn detach_secondary(&self) {
        *self.secondary.lock().expect("secondary mutex poisoned") = None;
    }

    async fn stop(&self) {
        {
            let mut transport = self.transport.lock().await;
            let _ = transport.close().await;
        }
        self.teardown().await;
    }
}
