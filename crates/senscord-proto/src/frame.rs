use serde::{Deserialize, Serialize};

use senscord_shmem::{SharedAddressInfo, WIRE_SIZE};

/// How a channel's raw data is delivered to the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawDataInfo {
    /// The payload bytes are carried inline. The receiver copies them into a
    /// fresh allocation; the sender may release its source frame as soon as
    /// the send completes.
    AllData(Vec<u8>),
    /// The payload is a 20-byte `SharedAddressInfo` descriptor pointing into
    /// a named shared region. The receiver must map it and is required to
    /// reply so the sender can release the block.
    AddressSizeOnly(SharedAddressInfo),
}

impl RawDataInfo {
    /// Encode to the wire tuple `(delivering_mode, rawdata_bytes)` used by
    /// `Channel` (spec §6). Mode 0 is `AllData`, mode 1 is `AddressSizeOnly`.
    pub fn to_wire(&self) -> (u8, Vec<u8>) {
        match self {
            RawDataInfo::AllData(bytes) => (0, bytes.clone()),
            RawDataInfo::AddressSizeOnly(info) => (1, info.encode().to_vec()),
        }
    }

    /// Decode from the wire tuple. Returns `None` if `mode == 1` and `bytes`
    /// does not decode as a valid descriptor (caller should treat this as a
    /// protocol error, not fall back silently — unlike the allocator layer's
    /// own fallback for arbitrary client bytes).
    pub fn from_wire(mode: u8, bytes: &[u8]) -> Option<Self> {
        match mode {
            0 => Some(RawDataInfo::AllData(bytes.to_vec())),
            1 => {
                if bytes.len() != WIRE_SIZE {
                    return None;
                }
                SharedAddressInfo::decode(bytes).map(RawDataInfo::AddressSizeOnly)
            }
            _ => None,
        }
    }

    pub fn is_all_data(&self) -> bool {
        matches!(self, RawDataInfo::AllData(_))
    }
}

/// One property key/value snapshot attached to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// A single channel's payload within a [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: u32,
    pub allocator_key: String,
    pub raw_data_info: RawDataInfo,
    pub rawdata_type: String,
    pub timestamp: u64,
    pub properties: Vec<PropertyEntry>,
    pub updated_property_keys: Vec<String>,
}

/// One frame within a `SendFrame` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub sequence_number: u64,
    pub sent_time: u64,
    pub user_data: Vec<u8>,
    pub channels: Vec<Channel>,
}

impl Frame {
    /// A frame is pending release iff it has at least one channel (spec §4.6).
    pub fn is_pending(&self) -> bool {
        !self.channels.is_empty()
    }

    /// True iff every channel in this frame is delivered `AllData` — such a
    /// frame is considered accessed as soon as it is sent (spec §4.6/§4.10).
    pub fn all_channels_all_data(&self) -> bool {
        self.channels.iter().all(|c| c.raw_data_info.is_all_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channel(mode: RawDataInfo) -> Channel {
        Channel {
            channel_id: 1,
            allocator_key: "alloc-0".into(),
            raw_data_info: mode,
            rawdata_type: "image".into(),
            timestamp: 0,
            properties: vec![],
            updated_property_keys: vec![],
        }
    }

    #[test]
    fn frame_with_no_channels_is_not_pending() {
        let frame = Frame {
            sequence_number: 1,
            sent_time: 0,
            user_data: vec![],
            channels: vec![],
        };
        assert!(!frame.is_pending());
    }

    #[test]
    fn all_data_channels_marks_frame_all_data() {
        let frame = Frame {
            sequence_number: 1,
            sent_time: 0,
            user_data: vec![],
            channels: vec![sample_channel(RawDataInfo::AllData(vec![1, 2, 3]))],
        };
        assert!(frame.is_pending());
        assert!(frame.all_channels_all_data());
    }

    #[test]
    fn descriptor_wire_round_trip() {
        let info = SharedAddressInfo {
            physical_address: 0,
            allocated_size: 4096,
            offset: 0,
            size: 64,
        };
        let raw = RawDataInfo::AddressSizeOnly(info);
        let (mode, bytes) = raw.to_wire();
        assert_eq!(mode, 1);
        let decoded = RawDataInfo::from_wire(mode, &bytes).unwrap();
        assert_eq!(decoded, raw);
        assert!(!decoded.is_all_data());
    }

    #[test]
    fn corrupt_descriptor_bytes_fail_to_decode() {
        assert!(RawDataInfo::from_wire(1, &[0u8; 19]).is_none());
    }
}
