//! `SharedAddressInfo`: the 20-byte wire descriptor for a shared-memory block.
//!
//! Layout (little-endian): `physical_address:i32, allocated_size:i32,
//! offset:i32, size:i32, checksum:u32`. Checksum is CRC-32 over the first 16
//! bytes. Ported from `SharedAddress`/`SharedAddressInfo` in the original
//! `shared_memory_allocator.cpp`.

use crate::crc32;

pub const WIRE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedAddressInfo {
    pub physical_address: i32,
    pub allocated_size: i32,
    pub offset: i32,
    pub size: i32,
}

impl SharedAddressInfo {
    fn body_bytes(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&self.physical_address.to_le_bytes());
        buf[4..8].copy_from_slice(&self.allocated_size.to_le_bytes());
        buf[8..12].copy_from_slice(&self.offset.to_le_bytes());
        buf[12..16].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Serialize to the 20-byte wire form, appending the CRC-32 of the body.
    pub fn encode(&self) -> [u8; WIRE_SIZE] {
        let body = self.body_bytes();
        let checksum = crc32::checksum(&body);
        let mut out = [0u8; WIRE_SIZE];
        out[0..16].copy_from_slice(&body);
        out[16..20].copy_from_slice(&checksum.to_le_bytes());
        out
    }

    /// Decode a 20-byte wire payload, verifying the checksum.
    ///
    /// Returns `None` on size mismatch or checksum mismatch — per spec.md
    /// §4.11 this is not an error, it signals "not a descriptor" to the
    /// caller, which should fall back to a private allocation.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != WIRE_SIZE {
            return None;
        }
        let body = &data[0..16];
        let checksum = u32::from_le_bytes(data[16..20].try_into().ok()?);
        if crc32::checksum(body) != checksum {
            return None;
        }
        Some(SharedAddressInfo {
            physical_address: i32::from_le_bytes(body[0..4].try_into().ok()?),
            allocated_size: i32::from_le_bytes(body[4..8].try_into().ok()?),
            offset: i32::from_le_bytes(body[8..12].try_into().ok()?),
            size: i32::from_le_bytes(body[12..16].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let info = SharedAddressInfo {
            physical_address: 4096,
            allocated_size: 8192,
            offset: 64,
            size: 128,
        };
        let wire = info.encode();
        assert_eq!(wire.len(), WIRE_SIZE);
        let decoded = SharedAddressInfo::decode(&wire).expect("valid descriptor");
        assert_eq!(decoded, info);
    }

    #[test]
    fn single_bit_flip_is_detected() {
        let info = SharedAddressInfo {
            physical_address: 0,
            allocated_size: 64,
            offset: 0,
            size: 64,
        };
        let wire = info.encode();
        for byte_idx in 0..wire.len() {
            for bit in 0..8u8 {
                let mut flipped = wire;
                flipped[byte_idx] ^= 1 << bit;
                assert!(
                    SharedAddressInfo::decode(&flipped).is_none(),
                    "bit {byte_idx}:{bit} should have been detected"
                );
            }
        }
    }

    #[test]
    fn wrong_size_is_not_a_descriptor() {
        assert!(SharedAddressInfo::decode(&[0u8; 19]).is_none());
        assert!(SharedAddressInfo::decode(&[0u8; 21]).is_none());
        assert!(SharedAddressInfo::decode(&[]).is_none());
    }
}
