//! CRC-8 used to seal the gauge RAM (polynomial x^8 + x^2 + x + 1, zero init)

/// Computes the checksum of `data`. A buffer that already ends with its own
/// checksum folds to zero.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u32 = 0;

    for byte in data {
        crc ^= *byte as u32;

        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x100 != 0 {
                crc ^= 7;
            }
        }

        crc &= 0xFF;
    }

    crc as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_zero() {
        assert_eq!(crc8(&[]), 0);
    }

    #[test]
    fn matches_reference_values() {
        // CRC-8/SMBUS check value
        assert_eq!(crc8(b"123456789"), 0xF4);
        assert_eq!(crc8(&[0x01]), 0x07);
        assert_eq!(crc8(&[0xFF]), 0xF3);
    }

    #[test]
    fn is_deterministic() {
        let data = [0xA9, 0x53, 0x00, 0x40, 0x12, 0x34];
        assert_eq!(crc8(&data), crc8(&data));
    }

    #[test]
    fn appended_checksum_folds_to_zero() {
        let mut data = [0xA9, 0x53, 0x00, 0x40, 0x0F, 0x01, 0x00];
        let last = data.len() - 1;

        data[last] = crc8(&data[..last]);
        assert_eq!(crc8(&data), 0);
    }
}
