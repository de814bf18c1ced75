use std::collections::HashMap;

/// SDK-level channel payload, independent of wire encoding — the stream and
/// publisher adapters translate this into `senscord_proto::Channel` (picking
/// a delivery mode via the transport's raw-data hook) and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkChannel {
    pub channel_id: u32,
    pub allocator_key: String,
    pub rawdata: Vec<u8>,
    pub rawdata_type: String,
    pub timestamp: u64,
    pub properties: Vec<(String, Vec<u8>)>,
    pub updated_property_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkFrame {
    pub sequence_number: u64,
    pub sent_time: u64,
    pub user_data: Vec<u8>,
    pub channels: Vec<SdkChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVersionRecord {
    pub stream_key: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub name: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub description: String,
    pub stream_versions: Vec<StreamVersionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamCatalogEntry {
    pub key: String,
    pub r#type: String,
}

pub type Arguments = HashMap<String, String>;

/// SDK-level event argument, independent of wire encoding (mirrors
/// `SdkChannel`'s split from `senscord_proto::Channel`).
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEventArgValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// One server-side event ready for delivery to the client (spec §4.6
/// "Event publishing").
#[derive(Debug, Clone, PartialEq)]
pub struct SdkEvent {
    pub event_type: String,
    pub args: HashMap<String, SdkEventArgValue>,
}
