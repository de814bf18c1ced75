use serde::{Deserialize, Serialize};

/// Discriminates the four roles a [`crate::message::Message`] can play on
/// the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Reply = 1,
    SendFrame = 2,
    SendEvent = 3,
    Handshake = 4,
}

/// Closed set of payload kinds a message can carry, independent of
/// `MessageType` (e.g. `SendFrame` data_type pairs with both `MessageType::SendFrame`
/// and, for the reply, `MessageType::Reply`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Open = 0,
    Close = 1,
    Start = 2,
    Stop = 3,
    ReleaseFrame = 4,
    GetProperty = 5,
    SetProperty = 6,
    LockProperty = 7,
    UnlockProperty = 8,
    SendFrame = 9,
    SendEvent = 10,
    Disconnect = 11,
    SecondaryConnect = 12,
    RegisterEvent = 13,
    UnregisterEvent = 14,
    GetVersion = 15,
    GetPropertyList = 16,
    GetStreamList = 17,
    GetServerConfig = 18,
    OpenPublisher = 19,
    ClosePublisher = 20,
}

/// Header carried by every message. `server_stream_id == 0` is reserved for
/// "no resource / global" (handshake, version, stream-list lookups).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub server_stream_id: u64,
    pub request_id: u64,
    pub r#type: MessageType,
    pub data_type: DataType,
}

impl Header {
    pub const GLOBAL_STREAM_ID: u64 = 0;

    pub fn new(
        server_stream_id: u64,
        request_id: u64,
        r#type: MessageType,
        data_type: DataType,
    ) -> Self {
        Self {
            server_stream_id,
            request_id,
            r#type,
            data_type,
        }
    }

    pub fn is_global(&self) -> bool {
        self.server_stream_id == Self::GLOBAL_STREAM_ID
    }
}
