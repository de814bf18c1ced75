//! Frame reconstruction (spec §4.10): map each inbound channel's descriptor
//! into local memory via the allocator cache, copying inline bytes in for
//! `AllData` channels.

use std::collections::HashMap;
use std::sync::Arc;

use senscord_proto::{Frame, RawDataInfo};
use senscord_shmem::{MappedBlock, SharedMemoryAllocator};

use crate::allocator_cache::AllocatorCache;
use crate::error::ClientError;

/// Allocator key used for channels that declare none. Matches the default
/// allocator name every client connection opens lazily on first use.
pub const DEFAULT_ALLOCATOR_KEY: &str = "default";

pub struct ReconstructedChannel {
    pub channel_id: u32,
    pub rawdata_type: String,
    pub timestamp: u64,
    pub properties: HashMap<String, Vec<u8>>,
    pub updated_property_keys: Vec<String>,
    pub memory: MappedBlock,
    allocator: Arc<SharedMemoryAllocator>,
}

impl ReconstructedChannel {
    pub fn rawdata(&self) -> Vec<u8> {
        self.allocator.read(&self.memory)
    }

    fn unmap(&self) {
        let _ = self.allocator.free(&self.memory);
    }
}

pub struct ReconstructedFrame {
    pub sequence_number: u64,
    pub sent_time: u64,
    pub user_data: Vec<u8>,
    pub channels: Vec<ReconstructedChannel>,
    /// True iff every channel arrived `AllData` — such a frame needs no
    /// upstream `ReleaseFrame` (spec §4.10).
    pub all_data: bool,
}

impl ReconstructedFrame {
    /// Unmaps every channel's memory (spec §4.10 "Outbound ReleaseFrame":
    /// "unmap each channel's memory"). Whether this also requires notifying
    /// the server is decided by the caller from `all_data`: an all-inline
    /// frame's bytes already live locally and its source was released the
    /// moment it was acknowledged, so only non-`all_data` frames need an
    /// explicit upstream `ReleaseFrame`.
    pub fn unmap(&self) {
        for channel in &self.channels {
            channel.unmap();
        }
    }
}

pub fn reconstruct_frame(cache: &AllocatorCache, frame: Frame) -> Result<ReconstructedFrame, ClientError> {
    let mut channels = Vec::with_capacity(frame.channels.len());
    let mut all_data = true;

    for channel in frame.channels {
        let key = if channel.allocator_key.is_empty() {
            DEFAULT_ALLOCATOR_KEY
        } else {
            channel.allocator_key.as_str()
        };
        let allocator = cache.get_or_open(key)?;

        let memory = match channel.raw_data_info {
            RawDataInfo::AllData(bytes) => {
                let block = allocator.allocate(bytes.len().max(1))?;
                allocator.write(&block, &bytes);
                block
            }
            RawDataInfo::AddressSizeOnly(info) => {
                all_data = false;
                allocator.map(&info.encode())?
            }
        };

        channels.push(ReconstructedChannel {
            channel_id: channel.channel_id,
            rawdata_type: channel.rawdata_type,
            timestamp: channel.timestamp,
            properties: channel.properties.into_iter().map(|p| (p.key, p.value)).collect(),
            updated_property_keys: channel.updated_property_keys,
            memory,
            allocator,
        });
    }

    Ok(ReconstructedFrame {
        sequence_number: frame.sequence_number,
        sent_time: frame.sent_time,
        user_data: frame.user_data,
        channels,
        all_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use senscord_proto::Channel;

    fn inline_channel(bytes: Vec<u8>) -> Channel {
        Channel {
            channel_id: 0,
            allocator_key: String::new(),
            raw_data_info: RawDataInfo::AllData(bytes),
            rawdata_type: "raw".into(),
            timestamp: 10,
            properties: vec![],
            updated_property_keys: vec![],
        }
    }

    #[test]
    fn all_data_channel_is_copied_into_local_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = AllocatorCache::new(dir.path());
        let frame = Frame {
            sequence_number: 1,
            sent_time: 0,
            user_data: vec![],
            channels: vec![inline_channel(vec![1, 2, 3, 4])],
        };
        let reconstructed = reconstruct_frame(&cache, frame).unwrap();
        assert!(reconstructed.all_data);
        assert_eq!(reconstructed.channels[0].rawdata(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn shared_descriptor_channel_maps_without_copy() {
        let dir = tempfile::tempdir().unwrap();
        let server_cache = AllocatorCache::new(dir.path());
        let server_alloc = server_cache.get_or_open("camera_0").unwrap();
        let block = server_alloc.allocate(64).unwrap();
        server_alloc.write(&block, &[0xAB; 64]);
        let wire = server_alloc.serialize(&block);

        let client_cache = AllocatorCache::new(dir.path());
        let frame = Frame {
            sequence_number: 2,
            sent_time: 0,
            user_data: vec![],
            channels: vec![Channel {
                channel_id: 0,
                allocator_key: "camera_0".into(),
                raw_data_info: RawDataInfo::AddressSizeOnly(
                    senscord_shmem::SharedAddressInfo::decode(&wire).unwrap(),
                ),
                rawdata_type: "raw".into(),
                timestamp: 0,
                properties: vec![],
                updated_property_keys: vec![],
            }],
        };
        let reconstructed = reconstruct_frame(&client_cache, frame).unwrap();
        assert!(!reconstructed.all_data);
        assert_eq!(reconstructed.channels[0].rawdata(), vec![0xAB; 64]);
    }
}
