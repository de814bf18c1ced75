//! TCP transport: length-prefixed bincode framing over `tokio::net::TcpStream`.

use async_trait::async_trait;
use senscord_proto::codec::{decode_body, encode_frame, read_prefix};
use senscord_proto::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, Duration};

use crate::{Transport, TransportError};

enum State {
    Unopened,
    Bound(TcpListener),
    Connected(TcpStream),
}

pub struct TcpTransport {
    state: State,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            state: State::Unopened,
        }
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-connected stream, e.g. the result of `accept`.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            state: State::Connected(stream),
        }
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, TransportError> {
        match &mut self.state {
            State::Connected(stream) => Ok(stream),
            _ => Err(TransportError::NotConnected),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self, _arguments: &[(String, String)]) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state = State::Unopened;
        Ok(())
    }

    async fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let stream = TcpStream::connect(address).await?;
        self.state = State::Connected(stream);
        Ok(())
    }

    async fn bind(&mut self, address: &str) -> Result<(), TransportError> {
        let listener = TcpListener::bind(address).await?;
        self.state = State::Bound(listener);
        Ok(())
    }

    async fn listen(&mut self) -> Result<(), TransportError> {
        match &self.state {
            State::Bound(_) => Ok(()),
            _ => Err(TransportError::NotConnected),
        }
    }

    async fn accept(&mut self) -> Result<(Box<dyn Transport>, bool), TransportError> {
        let listener = match &self.state {
            State::Bound(listener) => listener,
            _ => return Err(TransportError::NotConnected),
        };
        let (stream, peer) = listener.accept().await?;
        let local = stream.local_addr()?;
        let same_system = peer.ip() == local.ip();
        Ok((Box::new(TcpTransport::from_stream(stream)), same_system))
    }

    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let framed = encode_frame(message)?;
        let stream = self.stream_mut()?;
        stream.write_all(&framed).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Message, TransportError> {
        let stream = self.stream_mut()?;
        let mut prefix = [0u8; 4];
        stream.read_exact(&mut prefix).await?;
        let len = read_prefix(&prefix)?;
        let mut body = vec![0u8; len as usize];
        stream.read_exact(&mut body).await?;
        Ok(decode_body(&body)?)
    }

    async fn wait_readable(&mut self, timeout_nanos: u64) -> Result<(), TransportError> {
        let stream = self.stream_mut()?;
        let budget = Duration::from_nanos(timeout_nanos);
        match timeout(budget, stream.readable()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::header::{DataType, Header, MessageType};
    use senscord_proto::message::{Payload, StandardRequest};

    #[tokio::test]
    async fn connect_send_recv_round_trip() {
        let mut listener_transport = TcpTransport::new();
        listener_transport.bind("127.0.0.1:0").await.unwrap();
        let addr = match &listener_transport.state {
            State::Bound(l) => l.local_addr().unwrap(),
            _ => unreachable!(),
        };

        let accept_task = tokio::spawn(async move {
            let (mut server_side, same_system) = listener_transport.accept().await.unwrap();
            assert!(same_system);
            let message = server_side.recv().await.unwrap();
            message
        });

        let mut client = TcpTransport::new();
        client.connect(&addr.to_string()).await.unwrap();
        let message = Message::new(
            Header::new(0, 1, MessageType::Request, DataType::GetVersion),
            Payload::StandardRequest(StandardRequest),
        );
        client.send(&message).await.unwrap();

        let received = accept_task.await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn recv_without_connect_is_not_connected() {
        let mut transport = TcpTransport::new();
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::NotConnected)
        ));
    }
}
