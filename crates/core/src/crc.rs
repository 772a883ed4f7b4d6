/// CRC-8 over `data` using x^8 + x^2 + x + 1 (0x07), zero initial value,
/// no reflection and no final xor.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            };
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8_check_value() {
        // standard check input for CRC-8/SMBUS
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn test_crc8_empty_and_zero() {
        assert_eq!(crc8(&[]), 0);
        assert_eq!(crc8(&[0u8; 8]), 0);
    }

    #[test]
    fn test_crc8_detects_every_single_bit_flip() {
        let base = [0x01, 0x02, 0x40, 0x00, b'H', b'E', b'L', b'L'];
        let reference = crc8(&base);
        for bit in 0..64 {
            let mut flipped = base;
            flipped[bit / 8] ^= 1 << (bit % 8);
            assert_ne!(crc8(&flipped), reference, "bit {} flip undetected", bit);
        }
    }
}
