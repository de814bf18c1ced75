//! Reflected CRC-32 (poly 0xEDB88320), table-based.
//!
//! Ported directly from the original allocator's `MakeCrc32Table`/
//! `CalcChecksum` so checksums stay bit-for-bit compatible with existing
//! senders; this is not sourced from a crate on purpose (see DESIGN.md).

const POLY: u32 = 0xEDB8_8320;

fn table() -> &'static [u32; 256] {
    use std::sync::OnceLock;
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut c = i as u32;
            let mut j = 0;
            while j < 8 {
                c = if c & 1 != 0 { POLY ^ (c >> 1) } else { c >> 1 };
                j += 1;
            }
            table[i] = c;
            i += 1;
        }
        table
    })
}

/// CRC-32, init 0xFFFFFFFF, final XOR 0xFFFFFFFF.
pub fn checksum(buffer: &[u8]) -> u32 {
    let table = table();
    let mut c: u32 = 0xFFFF_FFFF;
    for &byte in buffer {
        c = table[((c ^ byte as u32) & 0xFF) as usize] ^ (c >> 8);
    }
    c ^ 0xFFFF_FFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        // CRC-32 of ASCII "123456789" is the standard check value 0xCBF43926.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn single_bit_flip_changes_checksum() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let base = checksum(&data);
        for byte_idx in 0..data.len() {
            for bit in 0..8u8 {
                let mut flipped = data;
                flipped[byte_idx] ^= 1 << bit;
                assert_ne!(checksum(&flipped), base, "bit {byte_idx}:{bit} undetected");
            }
        }
    }
}
