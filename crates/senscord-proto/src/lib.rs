//! Wire message types and framing shared by the senscord server and client.

pub mod cause;
pub mod codec;
pub mod frame;
pub mod header;
pub mod message;
pub mod status;

pub use cause::Cause;
pub use codec::{decode_body, encode_frame, read_prefix, CodecError, MAX_FRAME_BYTES};
pub use frame::{Channel, Frame, PropertyEntry, RawDataInfo};
pub use header::{DataType, Header, MessageType};
pub use message::{
    EventArgValue, GetPropertyListReply, LockPropertyReply, LockPropertyRequest, Message,
    OpenPublisherRequest, OpenReply, OpenRequest, Payload, PropertyReqReply,
    RegisterEventRequest, ReleaseFrameRequest, SecondaryConnectRequest, SendEventPayload,
    SendFramePayload, SendFrameReply, ServerConfigEntry, ServerConfigReply, StandardReply,
    StandardRequest, StreamListEntry, StreamListReply, StreamVersion, UnlockPropertyRequest,
    UnregisterEventRequest, VersionInfo, VersionReply,
};
pub use status::{Level, MessageStatus};
