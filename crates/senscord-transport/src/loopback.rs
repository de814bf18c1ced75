//! In-process transport pairing two endpoints through channels instead of a
//! socket. Used by same-host tests and by any deployment that colocates a
//! client and server in one process; `get_channel_raw_data` always prefers
//! shared-memory descriptors on this transport since "same system" is
//! trivially true.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use senscord_proto::{Channel, Message, RawDataInfo};
use tokio::sync::{mpsc, oneshot};

use crate::{Transport, TransportError};

struct ConnectRequest {
    reply: oneshot::Sender<(mpsc::UnboundedSender<Message>, mpsc::UnboundedReceiver<Message>)>,
}

type Registry = Mutex<HashMap<String, mpsc::UnboundedSender<ConnectRequest>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

enum State {
    Unopened,
    Listening {
        accept_rx: mpsc::UnboundedReceiver<ConnectRequest>,
    },
    Connected {
        out: mpsc::UnboundedSender<Message>,
        r#in: mpsc::UnboundedReceiver<Message>,
        /// A message pulled ahead by `wait_readable` and not yet consumed by
        /// `recv`. `mpsc::UnboundedReceiver` has no peek, so this is the
        /// buffer that lets the two calls stay decoupled.
        buffered: Option<Message>,
    },
}

pub struct LoopbackTransport {
    address: Option<String>,
    state: State,
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self {
            address: None,
            state: State::Unopened,
        }
    }
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn open(&mut self, _arguments: &[(String, String)]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(address) = self.address.take() {
            registry().lock().expect("loopback registry poisoned").remove(&address);
        }
        self.state = State::Unopened;
        Ok(())
    }

    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let accept_tx = registry()
            .lock()
            .expect("loopback registry poisoned")
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::InvalidArgument(format!("no listener at {address}")))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        accept_tx
            .send(ConnectRequest { reply: reply_tx })
            .map_err(|_| TransportError::Cancelled)?;
        let (out, r#in) = reply_rx.await.map_err(|_| TransportError::Cancelled)?;
        self.state = State::Connected {
            out,
            r#in,
            buffered: None,
        };
        Ok(())
    }

    async fn bind(&mut self, address: &str) -> Result<(), TransportError> {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let mut guard = registry().lock().expect("loopback registry poisoned");
        if guard.contains_key(address) {
            return Err(TransportError::InvalidArgument(format!(
                "address {address} already bound"
            )));
        }
        guard.insert(address.to_owned(), accept_tx);
        drop(guard);
        self.address = Some(address.to_owned());
        self.state = State::Listening { accept_rx };
        Ok(())
    }

    async fn listen(&mut self) -> Result<(), TransportError> {
        match &self.state {
            State::Listening { .. } => Ok(()),
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn accept(&mut self) -> Result<(Box<dyn Transport>, bool), TransportError> {
        let accept_rx = match &mut self.state {
            State::Listening { accept_rx } => accept_rx,
            _ => return Err(TransportError::NotConnected),
        };
        let request = accept_rx.recv().await.ok_or(TransportError::Cancelled)?;
        let (client_out, server_in) = mpsc::unbounded_channel();
        let (server_out, client_in) = mpsc::unbounded_channel();
        request
            .reply
            .send((client_out, client_in))
            .map_err(|_| TransportError::Cancelled)?;
        let server_side = LoopbackTransport {
            address: None,
            state: State::Connected {
                out: server_out,
                r#in: server_in,
                buffered: None,
            },
        };
        Ok((Box::new(server_side), true))
    }

    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        match &self.state {
            State::Connected { out, .. } => out
                .send(message.clone())
                .map_err(|_| TransportError::Cancelled),
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn recv(&mut self) -> Result<Message, TransportError> {
        match &mut self.state {
            State::Connected { r#in, buffered, .. } => {
                if let Some(message) = buffered.take() {
                    return Ok(message);
                }
                r#in.recv().await.ok_or(TransportError::Cancelled)
            }
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn wait_readable(&mut self, timeout_nanos: u64) -> Result<(), TransportError> {
        let (r#in, buffered) = match &mut self.state {
            State::Connected { r#in, buffered, .. } => (r#in, buffered),
            _ => return Err(TransportError::NotConnected),
        };
        if buffered.is_some() {
            return Ok(());
        }
        let budget = tokio::time::Duration::from_nanos(timeout_nanos);
        match tokio::time::timeout(budget, r#in.recv()).await {
            Ok(Some(message)) => {
                *buffered = Some(message);
                Ok(())
            }
            Ok(None) => Err(TransportError::Cancelled),
            Err(_) => Err(TransportError::Timeout),
        }
    }

    fn get_channel_raw_data(&self, _channel_hint: &Channel, bytes: Vec<u8>) -> RawDataInfo {
        RawDataInfo::AllData(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::header::{DataType, Header, MessageType};
    use senscord_proto::message::{Payload, StandardRequest};

    #[tokio::test]
    async fn connect_accept_send_recv_round_trip() {
        let mut listener = LoopbackTransport::new();
        listener.bind("loop://unit-test").await.unwrap();

        let accept_task = tokio::spawn(async move {
            let (mut server_side, same_system) = listener.accept().await.unwrap();
            assert!(same_system);
            server_side.recv().await.unwrap()
        });

        let mut client = LoopbackTransport::new();
        client.connect("loop://unit-test").await.unwrap();
        let message = Message::new(
            Header::new(0, 1, MessageType::Request, DataType::GetVersion),
            Payload::StandardRequest(StandardRequest),
        );
        client.send(&message).await.unwrap();

        let received = accept_task.await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn connect_to_unknown_address_is_invalid_argument() {
        let mut client = LoopbackTransport::new();
        assert!(matches!(
            client.connect("loop://does-not-exist").await,
            Err(TransportError::InvalidArgument(_))
        ));
    }
}
