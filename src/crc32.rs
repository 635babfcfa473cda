//! This module provides the CRC-32 (Ethernet/ISO-HDLC) checksum used to
//! validate data frames.
use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Calculate the CRC-32 over an arr of bytes.
pub fn crc32(arr: &[u8]) -> u32 {
    CRC32.checksum(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The standard check value for the Ethernet CRC-32 variant.
    #[test]
    fn test_check_value() {
        assert_eq!(0xCBF4_3926, crc32(b"123456789"));
    }

    #[test]
    fn test_empty() {
        assert_eq!(0x0000_0000, crc32(&[]));
    }

    #[test]
    fn test_differs_on_single_bit_flip() {
        let a = [0u8; 512];
        let mut b = [0u8; 512];
        b[0] = 0x01;
        assert_ne!(crc32(&a), crc32(&b));
    }
}
