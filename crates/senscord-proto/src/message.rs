use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::header::Header;
use crate::status::MessageStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardReply {
    pub status: MessageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub stream_key: String,
    pub arguments: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReply {
    pub status: MessageStatus,
    pub property_key_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVersion {
    pub stream_key: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub name: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub description: String,
    pub stream_versions: Vec<StreamVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
    pub status: MessageStatus,
    pub version: VersionInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamListEntry {
    pub key: String,
    pub r#type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamListReply {
    pub status: MessageStatus,
    pub stream_list: Vec<StreamListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyReqReply {
    pub status: MessageStatus,
    pub key: String,
    pub property: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPropertyListReply {
    pub status: MessageStatus,
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPropertyRequest {
    pub keys: Vec<String>,
    pub timeout_msec: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPropertyReply {
    pub status: MessageStatus,
    pub resource_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockPropertyRequest {
    pub resource_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFramePayload {
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFrameReply {
    pub sequence_numbers: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFrameRequest {
    pub sequence_number: u64,
    pub rawdata_accessed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPublisherRequest {
    pub key: String,
}

/// A property-like value carried in `SendEvent`'s argument map. Kept as an
/// explicit enum (rather than raw bytes) so event consumers need not
/// re-implement type sniffing on every arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventArgValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendEventPayload {
    pub event_type: String,
    pub args: HashMap<String, EventArgValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEventRequest {
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnregisterEventRequest {
    pub event_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryConnectRequest {
    pub server_stream_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfigEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfigReply {
    pub status: MessageStatus,
    pub entries: Vec<ServerConfigEntry>,
}

/// Every payload shape a [`Header::data_type`] can pair with.
///
/// Field order in each struct above is part of the wire contract (spec §6);
/// this enum just adds the discriminant the transport needs to pick a
/// decoder, since `bincode` itself is not self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    StandardRequest(StandardRequest),
    StandardReply(StandardReply),
    OpenRequest(OpenRequest),
    OpenReply(OpenReply),
    VersionReply(VersionReply),
    StreamListReply(StreamListReply),
    PropertyReqReply(PropertyReqReply),
    GetPropertyListReply(GetPropertyListReply),
    LockPropertyRequest(LockPropertyRequest),
    LockPropertyReply(LockPropertyReply),
    UnlockPropertyRequest(UnlockPropertyRequest),
    SendFrame(SendFramePayload),
    SendFrameReply(SendFrameReply),
    ReleaseFrameRequest(ReleaseFrameRequest),
    OpenPublisherRequest(OpenPublisherRequest),
    SendEvent(SendEventPayload),
    RegisterEventRequest(RegisterEventRequest),
    UnregisterEventRequest(UnregisterEventRequest),
    SecondaryConnectRequest(SecondaryConnectRequest),
    ServerConfigReply(ServerConfigReply),
}

/// The transport-level unit: header plus its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub header: Header,
    pub payload: Payload,
}

impl Message {
    pub fn new(header: Header, payload: Payload) -> Self {
        Self { header, payload }
    }

    /// Build a standard OK reply, echoing `request_id`.
    pub fn reply_ok(request: &Header, data_type: crate::header::DataType) -> Self {
        Self {
            header: Header::new(
                request.server_stream_id,
                request.request_id,
                crate::header::MessageType::Reply,
                data_type,
            ),
            payload: Payload::StandardReply(StandardReply {
                status: MessageStatus::ok(),
            }),
        }
    }

    pub fn reply_error(
        request: &Header,
        data_type: crate::header::DataType,
        status: MessageStatus,
    ) -> Self {
        Self {
            header: Header::new(
                request.server_stream_id,
                request.request_id,
                crate::header::MessageType::Reply,
                data_type,
            ),
            payload: Payload::StandardReply(StandardReply { status }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cause::Cause;
    use crate::header::{DataType, MessageType};

    #[test]
    fn reply_ok_echoes_request_id_and_stream_id() {
        let request = Header::new(7, 42, MessageType::Request, DataType::GetVersion);
        let reply = Message::reply_ok(&request, DataType::GetVersion);
        assert_eq!(reply.header.request_id, 42);
        assert_eq!(reply.header.server_stream_id, 7);
        assert_eq!(reply.header.r#type, MessageType::Reply);
        match reply.payload {
            Payload::StandardReply(r) => assert!(r.status.ok),
            _ => panic!("expected StandardReply"),
        }
    }

    #[test]
    fn reply_error_carries_cause() {
        let request = Header::new(0, 1, MessageType::Request, DataType::Open);
        let status = MessageStatus::error(Cause::NotFound, "client_adapter", "no such stream");
        let reply = Message::reply_error(&request, DataType::Open, status.clone());
        match reply.payload {
            Payload::StandardReply(r) => assert_eq!(r.status, status),
            _ => panic!("expected StandardReply"),
        }
    }
}
