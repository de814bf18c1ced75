//! One-shot version/config fetchers (spec.md §2 component table's
//! "version fetcher"/"server config fetcher"): open a transient
//! connection, send a single global request, wait for the reply, and
//! hand back the decoded result without leaving a standing connection
//! behind. Grounded on `version_fetcher.cpp`/`server_config_fetcher.cpp`'s
//! connect-request-wait-close shape, reusing this crate's own
//! [`Messenger`] instead of a dedicated receive thread.

use std::time::Duration;

use senscord_proto::{DataType, Header, Message, MessageType, Payload, ServerConfigEntry, StandardRequest, VersionInfo};
use senscord_transport::Transport;

use crate::error::ClientError;
use crate::messenger::Messenger;

/// Opens `transport`, requests the server's version record, and closes the
/// connection again. `transport` must already be connected.
pub async fn fetch_version(
    transport: Box<dyn Transport>,
    timeout: Duration,
) -> Result<VersionInfo, ClientError> {
    let messenger = Messenger::new(transport);
    messenger.spawn_receive_loop();
    let request_id = messenger.next_request_id();
    let request = Message::new(
        Header::new(Header::GLOBAL_STREAM_ID, request_id, MessageType::Request, DataType::GetVersion),
        Payload::StandardRequest(StandardRequest),
    );
    let reply = messenger.request(request, timeout).await;
    messenger.close().await;

    match reply? {
        Message { payload: Payload::VersionReply(r), .. } => {
            ClientError::from_status(&r.status).map_or(Ok(r.version), Err)
        }
        _ => Err(ClientError::UnexpectedReply),
    }
}

/// Opens `transport`, requests the server's configuration entries, and
/// closes the connection again.
pub async fn fetch_server_config(
    transport: Box<dyn Transport>,
    timeout: Duration,
) -> Result<Vec<ServerConfigEntry>, ClientError> {
    let messenger = Messenger::new(transport);
    messenger.spawn_receive_loop();
    let request_id = messenger.next_request_id();
    let request = Message::new(
        Header::new(Header::GLOBAL_STREAM_ID, request_id, MessageType::Request, DataType::GetServerConfig),
        Payload::StandardRequest(StandardRequest),
    );
    let reply = messenger.request(request, timeout).await;
    messenger.close().await;

    match reply? {
        Message { payload: Payload::ServerConfigReply(r), .. } => {
            ClientError::from_status(&r.status).map_or(Ok(r.entries), Err)
        }
        _ => Err(ClientError::UnexpectedReply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::{MessageStatus, ServerConfigReply, StreamVersion, VersionReply};
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
        (Box::new(client), server_side)
    }

    #[tokio::test]
    async fn fetch_version_returns_decoded_record() {
        let (client_transport, mut server_transport) = connected_pair("loop://fetch-version").await;

        let responder = tokio::spawn(async move {
            let received = server_transport.recv().await.unwrap();
            let reply = Message::new(
                Header::new(
                    received.header.server_stream_id,
                    received.header.request_id,
                    MessageType::Reply,
                    DataType::GetVersion,
                ),
                Payload::VersionReply(VersionReply {
                    status: MessageStatus::ok(),
                    version: VersionInfo {
                        name: "demo".into(),
                        major: 1,
                        minor: 2,
                        patch: 3,
                        description: "test".into(),
                        stream_versions: vec![StreamVersion {
                            stream_key: "camera_0".into(),
                            major: 1,
                            minor: 0,
                            patch: 0,
                            description: String::new(),
                        }],
                    },
                }),
            );
            server_transport.send(&reply).await.unwrap();
        });

        let version = fetch_version(client_transport, Duration::from_secs(1)).await.unwrap();
        assert_eq!(version.name, "demo");
        assert_eq!(version.stream_versions.len(), 1);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn fetch_server_config_returns_entries() {
        let (client_transport, mut server_transport) = connected_pair("loop://fetch-config").await;

        let responder = tokio::spawn(async move {
            let received = server_transport.recv().await.unwrap();
            let reply = Message::new(
                Header::new(
                    received.header.server_stream_id,
                    received.header.request_id,
                    MessageType::Reply,
                    DataType::GetServerConfig,
                ),
                Payload::ServerConfigReply(ServerConfigReply {
                    status: MessageStatus::ok(),
                    entries: vec![ServerConfigEntry { key: "client_enabled".into(), value: "true".into() }],
                }),
            );
            server_transport.send(&reply).await.unwrap();
        });

        let entries = fetch_server_config(client_transport, Duration::from_secs(1)).await.unwrap();
        assert_eq!(entries, vec![ServerConfigEntry { key: "client_enabled".into(), value: "true".into() }]);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn fetch_version_propagates_error_status() {
        let (client_transport, mut server_transport) = connected_pair("loop://fetch-version-error").await;

        let responder = tokio::spawn(async move {
            let received = server_transport.recv().await.unwrap();
            let reply = Message::reply_error(
                &received.header,
                DataType::GetVersion,
                senscord_proto::MessageStatus::error(senscord_proto::Cause::Aborted, "core", "not ready"),
            );
            server_transport.send(&reply).await.unwrap();
        });

        let result = fetch_version(client_transport, Duration::from_secs(1)).await;
        assert!(result.is_err());
        responder.await.unwrap();
    }
}
