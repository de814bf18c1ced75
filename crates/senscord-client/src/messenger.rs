//! Per-connection messenger (spec §4.10): owns one transport, dispatches
//! inbound replies to whichever caller is waiting on the matching
//! `request_id`, and hands inbound SendFrame/SendEvent traffic to a per-port
//! subscriber. Mirrors the `ForwarderCommand { reply: oneshot::Sender<...> }`
//! wait pattern the server side's request/reply plumbing is built on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use senscord_proto::{DataType, Header, Message, MessageType};
use senscord_transport::{Transport, TransportError};
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::ClientError;

/// Default reply timeout (spec §4.10): 30,000 ms.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Routes inbound `SendFrame`/`SendEvent` traffic to whatever local consumer
/// owns `server_stream_id`, keyed the same way the request/reply table is.
pub trait InboundSink: Send + Sync {
    fn on_frame(&self, server_stream_id: u64, frame: senscord_proto::Frame);
    fn on_event(&self, server_stream_id: u64, event: senscord_proto::SendEventPayload);
}

struct Waiters {
    next_request_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<Message>>>,
}

/// Owns one transport connection to a server (primary or secondary) and the
/// request/reply bookkeeping for it. `run()` must be spawned once; all other
/// methods are safe to call concurrently from many ports.
pub struct Messenger {
    transport: AsyncMutex<Box<dyn Transport>>,
    waiters: Waiters,
    disconnected: AtomicBool,
    sink: Mutex<Option<std::sync::Arc<dyn InboundSink>>>,
}

impl Messenger {
    pub fn new(transport: Box<dyn Transport>) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            transport: AsyncMutex::new(transport),
            waiters: Waiters {
                next_request_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
            },
            disconnected: AtomicBool::new(false),
            sink: Mutex::new(None),
        })
    }

    pub fn set_inbound_sink(&self, sink: std::sync::Arc<dyn InboundSink>) {
        *self.sink.lock().expect("sink mutex poisoned") = Some(sink);
    }

    pub fn next_request_id(&self) -> u64 {
        self.waiters.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Spawns the receive loop. Returns a handle the owner can await at
    /// teardown.
    pub fn spawn_receive_loop(self: &std::sync::Arc<Self>) -> JoinHandle<()> {
        let messenger = self.clone();
        tokio::spawn(async move { messenger.run().await })
    }

    async fn run(self: std::sync::Arc<Self>) {
        loop {
            let waited = {
                let mut transport = self.transport.lock().await;
                transport.wait_readable(1_000_000_000).await
            };
            match waited {
                Ok(()) => {}
                Err(TransportError::Timeout) => continue,
                Err(_) => break,
            }
            let received = {
                let mut transport = self.transport.lock().await;
                transport.recv().await
            };
            match received {
                Ok(message) => self.dispatch(message),
                Err(_) => break,
            }
        }
        self.disconnected.store(true, Ordering::Release);
        self.wake_all_waiters_disconnected();
    }

    fn dispatch(&self, message: Message) {
        match message.header.r#type {
            MessageType::Reply => {
                if let Some(tx) = self
                    .waiters
                    .pending
                    .lock()
                    .expect("waiters mutex poisoned")
                    .remove(&message.header.request_id)
                {
                    let _ = tx.send(message);
                }
            }
            MessageType::SendFrame => {
                if let senscord_proto::Payload::SendFrame(payload) = message.payload {
                    if let Some(sink) = self.sink.lock().expect("sink mutex poisoned").clone() {
                        for frame in payload.frames {
                            sink.on_frame(message.header.server_stream_id, frame);
                        }
                    }
                }
            }
            MessageType::SendEvent => {
                if let senscord_proto::Payload::SendEvent(payload) = message.payload {
                    if let Some(sink) = self.sink.lock().expect("sink mutex poisoned").clone() {
                        sink.on_event(message.header.server_stream_id, payload);
                    }
                }
            }
            MessageType::Request | MessageType::Handshake => {
                tracing::debug!(data_type = ?message.header.data_type, "messenger: ignoring inbound request-shaped message");
            }
        }
    }

    fn wake_all_waiters_disconnected(&self) {
        let pending: Vec<_> = self
            .waiters
            .pending
            .lock()
            .expect("waiters mutex poisoned")
            .drain()
            .collect();
        for (_, tx) in pending {
            drop(tx);
        }
    }

    /// Sends `msg` and waits up to `timeout` for a reply with the same
    /// `request_id`. Lock/Unlock callers should fold the command's own lock
    /// timeout into `timeout` (spec §4.10).
    pub async fn request(&self, msg: Message, timeout: Duration) -> Result<Message, ClientError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(ClientError::Disconnected);
        }
        let (tx, rx) = oneshot::channel();
        self.waiters
            .pending
            .lock()
            .expect("waiters mutex poisoned")
            .insert(msg.header.request_id, tx);

        {
            let mut transport = self.transport.lock().await;
            if let Err(e) = transport.send(&msg).await {
                self.waiters
                    .pending
                    .lock()
                    .expect("waiters mutex poisoned")
                    .remove(&msg.header.request_id);
                return Err(e.into());
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                self.waiters
                    .pending
                    .lock()
                    .expect("waiters mutex poisoned")
                    .remove(&msg.header.request_id);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Sends a message with no reply expected (frame/event egress, or a
    /// best-effort teardown notification).
    pub async fn send_fire_and_forget(&self, msg: Message) -> Result<(), ClientError> {
        let mut transport = self.transport.lock().await;
        transport.send(&msg).await.map_err(Into::into)
    }

    pub async fn close(&self) {
        let mut transport = self.transport.lock().await;
        let _ = transport.close().await;
    }
}

/// Sends a `SecondaryConnect` request on a freshly connected messenger and
/// waits for its reply (spec §4.10: "the client component opens a secondary
/// messenger... and immediately sends a SecondaryConnect request").
pub async fn secondary_connect(
    messenger: &Messenger,
    server_stream_id: u64,
    timeout: Duration,
) -> Result<(), ClientError> {
    let request_id = messenger.next_request_id();
    let msg = Message::new(
        Header::new(server_stream_id, request_id, MessageType::Request, DataType::SecondaryConnect),
        senscord_proto::Payload::SecondaryConnectRequest(senscord_proto::SecondaryConnectRequest {
            server_stream_id,
        }),
    );
    let reply = messenger.request(msg, timeout).await?;
    match reply.payload {
        senscord_proto::Payload::StandardReply(r) => {
            ClientError::from_status(&r.status).map_or(Ok(()), Err)
        }
        _ => Err(ClientError::UnexpectedReply),
    }
}
