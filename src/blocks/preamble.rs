//! Block preamble format.
//!
//! Every block is followed by an 18-byte preamble:
//! - Header length (4 bytes, big-endian)
//! - Body length (4 bytes, big-endian)
//! - Type (4 bytes, big-endian)
//! - CRC16 of the first 12 bytes (2 bytes), written twice
//! - Start-of-block marker `#!` (2 bytes)
//!
//! Scanning backward meets the marker first, then the preamble, then the
//! header and body it describes.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, BytesMut};
use crc::{Crc, CRC_16_ARC};

/// Start-of-block marker.
pub const SOB: [u8; 2] = [0x23, 0x21];

/// Size of an encoded preamble.
pub const PREAMBLE_SIZE: usize = 18;

/// Bytes covered by the checksum.
const CHECKED_SIZE: usize = 12;

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC16/ARC checksum.
pub fn crc16(data: &[u8]) -> u16 {
    CRC16.checksum(data)
}

/// Decoded preamble fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    /// Header length in bytes
    pub header_len: u32,
    /// Body length in bytes
    pub body_len: u32,
    /// Block type
    pub block_type: u32,
}

impl Preamble {
    /// Create a preamble
    pub fn new(header_len: u32, body_len: u32, block_type: u32) -> Self {
        Self { header_len, body_len, block_type }
    }

    /// Encode the preamble into bytes
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PREAMBLE_SIZE);
        buf.put_u32(self.header_len);
        buf.put_u32(self.body_len);
        buf.put_u32(self.block_type);

        let checksum = crc16(&buf[..CHECKED_SIZE]);
        buf.put_u16(checksum);
        buf.put_u16(checksum);
        buf.put_slice(&SOB);
        buf
    }

    /// Decode a preamble, verifying marker and both checksum copies
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != PREAMBLE_SIZE {
            return Err(Error::Corruption(format!(
                "Preamble must be {} bytes, got {}",
                PREAMBLE_SIZE,
                data.len()
            )));
        }
        if data[PREAMBLE_SIZE - SOB.len()..] != SOB {
            return Err(Error::corruption("Preamble does not end in a start-of-block marker"));
        }

        let mut buf = data;
        let header_len = buf.get_u32();
        let body_len = buf.get_u32();
        let block_type = buf.get_u32();
        let first = buf.get_u16();
        let second = buf.get_u16();

        let expected = crc16(&data[..CHECKED_SIZE]);
        if first != second || first != expected {
            return Err(Error::Corruption(format!(
                "Checksum mismatch: expected {:#06x}, got {:#06x}/{:#06x}",
                expected, first, second
            )));
        }

        Ok(Self { header_len, body_len, block_type })
    }

    /// Header plus body length
    pub fn span(&self) -> u64 {
        self.header_len as u64 + self.body_len as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_preamble_layout() {
        let encoded = Preamble::new(6, 4, 100).encode();
        assert_eq!(encoded.len(), PREAMBLE_SIZE);
        assert_eq!(&encoded[0..4], &6u32.to_be_bytes());
        assert_eq!(&encoded[4..8], &4u32.to_be_bytes());
        assert_eq!(&encoded[8..12], &100u32.to_be_bytes());
        assert_eq!(encoded[12..14], encoded[14..16]);
        assert_eq!(&encoded[16..18], &SOB);

        let decoded = Preamble::decode(&encoded).unwrap();
        assert_eq!(decoded, Preamble::new(6, 4, 100));
        assert_eq!(decoded.span(), 10);
    }

    #[test]
    fn test_checksum_validation() {
        let mut encoded = Preamble::new(6, 4, 100).encode();
        encoded[3] ^= 0xFF;
        assert!(matches!(Preamble::decode(&encoded), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_checksum_copies_must_agree() {
        let mut encoded = Preamble::new(6, 4, 100).encode();
        encoded[14] ^= 0x01;
        assert!(Preamble::decode(&encoded).is_err());
    }

    #[test]
    fn test_marker_and_length_checked() {
        let mut encoded = Preamble::new(0, 0, 100).encode();
        assert!(Preamble::decode(&encoded[1..]).is_err());
        encoded[17] = b'?';
        assert!(Preamble::decode(&encoded).is_err());
    }
}
