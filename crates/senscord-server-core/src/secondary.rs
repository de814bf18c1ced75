//! Secondary client adapter (spec §4.8): a thin adapter whose only purpose
//! is to offer a second egress channel for one stream's frame traffic.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use senscord_proto::{
    Cause, DataType, Header, Message, MessageStatus, MessageType, Payload, SecondaryConnectRequest,
    StandardReply,
};
use senscord_transport::{Transport, TransportError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::manager::{ClientAdapterManager, FrameSink, ManagedAdapter};

pub struct SecondaryClientAdapter {
    adapter_id: u64,
    transport: AsyncMutex<Box<dyn Transport>>,
    manager: Arc<ClientAdapterManager>,
    attached_primary: Mutex<Option<Arc<dyn ManagedAdapter>>>,
    retire_tx: mpsc::UnboundedSender<u64>,
}

impl SecondaryClientAdapter {
    pub fn new(adapter_id: u64, transport: Box<dyn Transport>, manager: Arc<ClientAdapterManager>) -> Arc<Self> {
        let retire_tx = manager.retire_handle();
        Arc::new(Self {
            adapter_id,
            transport: AsyncMutex::new(transport),
            manager,
            attached_primary: Mutex::new(None),
            retire_tx,
        })
    }

    pub fn spawn_receive_loop(self: Arc<Self>) {
        tokio::spawn(async move {
            self.clone().run().await;
            self.detach().await;
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
                Err(_) => return,
            }
            let received = {
                let mut transport = self.transport.lock().await;
                transport.recv().await
            };
            match received {
                Ok(message) => self.clone().dispatch(message).await,
                Err(_) => return,
            }
        }
    }

    async fn dispatch(self: Arc<Self>, message: Message) {
        let header = message.header;
        if header.r#type == MessageType::Handshake {
            return;
        }
        match header.data_type {
            DataType::Disconnect => {
                let _ = self.send(Message::reply_ok(&header, DataType::Disconnect)).await;
            }
            DataType::SecondaryConnect => self.handle_secondary_connect(header, message.payload).await,
            other => {
                tracing::warn!(adapter_id = self.adapter_id, data_type = ?other, "secondary adapter: unsupported message");
            }
        }
    }

    async fn handle_secondary_connect(self: &Arc<Self>, header: Header, payload: Payload) {
        let Payload::SecondaryConnectRequest(SecondaryConnectRequest { server_stream_id }) = payload else {
            return;
        };

        let sink: Arc<dyn FrameSink> = self.clone();
        let attached = self.manager.set_secondary_adapter(server_stream_id, sink).await;
        let status = match &attached {
            Some(_) => MessageStatus::ok(),
            None => MessageStatus::error(Cause::NotFound, "secondary_adapter", "unknown stream id"),
        };
        *self.attached_primary.lock().expect("attached-primary mutex poisoned") = attached;

        let reply = Message::new(
            Header::new(server_stream_id, header.request_id, MessageType::Reply, DataType::SecondaryConnect),
            Payload::StandardReply(StandardReply { status }),
        );
        let _ = self.send(reply).await;
    }

    async fn send(&self, msg: Message) -> Result<(), TransportError> {
        self.transport.lock().await.send(&msg).await
    }

    async fn detach(&self) {
        let primary = self.attached_primary.lock().expect("attached-primary mutex poisoned").take();
        if let Some(primary) = primary {
            primary.detach_secondary().await;
        }
    }
}

#[async_trait]
impl FrameSink for SecondaryClientAdapter {
    async fn send_frame_message(&self, msg: Message) -> Result<(), TransportError> {
        self.send(msg).await
    }
}

#[async_trait]
impl ManagedAdapter for SecondaryClientAdapter {
    fn adapter_id(&self) -> u64 {
        self.adapter_id
    }

    async fn stop(&self) {
        let mut transport = self.transport.lock().await;
        let _ = transport.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_transport::loopback::LoopbackTransport;

    async fn connected_pair(addr: &str) -> (Box<dyn Transport>, Box<dyn Transport>) {
        let mut listener = LoopbackTransport::new();
        listener.bind(addr).await.unwrap();
        let accept_task = tokio::spawn(async move {
            let (server_side, _same_system) = listener.accept().await.unwrap();
            server_side
        });
        let mut client = LoopbackTransport::new();
        client.connect(addr).await.unwrap();
        let server_side = accept_task.await.unwrap();
        (server_side, Box::new(client))
    }

    #[tokio::test]
    async fn secondary_connect_to_unowned_stream_replies_not_found() {
        let (server_transport, mut client_transport) = connected_pair("loop://secondary-test").await;
        let manager = ClientAdapterManager::new();
        let adapter = SecondaryClientAdapter::new(1, server_transport, manager);
        adapter.clone().spawn_receive_loop();

        let request = Message::new(
            Header::new(Header::GLOBAL_STREAM_ID, 1, MessageType::Request, DataType::SecondaryConnect),
            Payload::SecondaryConnectRequest(SecondaryConnectRequest { server_stream_id: 42 }),
        );
        client_transport.send(&request).await.unwrap();
        let reply = client_transport.recv().await.unwrap();
        match reply.payload {
            Payload::StandardReply(r) => assert!(!r.status.ok),
            other => panic!("unexpected payload: {:?}", other),
        }
        adapter.stop().await;
    }
}
