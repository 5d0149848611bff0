//! Sorted block header and trailer.
//!
//! Layout, lowest offset first:
//!
//! ```text
//! header:  EOP(4) minKey(8) maxKey(8) bucketFactor(4) dataHash(16) indexHash(16)
//!          blockInfo(n) blockInfoLength(4) dataLength(4) indexLength(4)
//! trailer: headerHash(16) version(1) headerHash(16) SOP(4)
//! ```
//!
//! The lengths sit at the high end of the header so a backward reader can
//! size the whole header from the 12 bytes right below the trailer.

use super::{md5, EOP, SOP, VERSION};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Length of an MD5 digest.
pub const HASH_SIZE: usize = 16;

/// Header size without block info.
pub const HEADER_FIXED_SIZE: usize = 4 + 8 + 8 + 4 + HASH_SIZE + HASH_SIZE + 4 + 4 + 4;

/// Trailer size.
pub const TRAILER_SIZE: usize = HASH_SIZE + 1 + HASH_SIZE + 4;

/// Width of the length fields at the top of the header.
pub const LENGTHS_SIZE: usize = 12;

/// Parsed sorted block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortedBlockHeader {
    /// Smallest key in the block
    pub min_key: u64,
    /// Largest key in the block
    pub max_key: u64,
    /// Bucket width
    pub bucket_factor: u32,
    /// MD5 of the values region
    pub data_hash: [u8; HASH_SIZE],
    /// MD5 of the outer index region
    pub index_hash: [u8; HASH_SIZE],
    /// Caller metadata
    pub block_info: Bytes,
    /// Length of the values region
    pub data_len: u32,
    /// Length of the outer index region
    pub index_len: u32,
}

/// Lengths read from the top of a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLengths {
    /// Length of the block info field
    pub block_info_len: u32,
    /// Length of the values region
    pub data_len: u32,
    /// Length of the outer index region
    pub index_len: u32,
}

impl HeaderLengths {
    /// Decode the 12 length bytes at the top of a header.
    pub fn decode(mut data: &[u8]) -> Result<Self> {
        if data.len() != LENGTHS_SIZE {
            return Err(Error::corruption(format!("Header lengths must be {} bytes", LENGTHS_SIZE)));
        }
        Ok(Self {
            block_info_len: data.get_u32(),
            data_len: data.get_u32(),
            index_len: data.get_u32(),
        })
    }

    /// Full header size.
    pub fn header_size(&self) -> u64 {
        HEADER_FIXED_SIZE as u64 + self.block_info_len as u64
    }

    /// Header plus the regions below it.
    pub fn block_size(&self) -> u64 {
        self.header_size() + self.data_len as u64 + self.index_len as u64
    }
}

impl SortedBlockHeader {
    /// Encode the header.
    pub fn encode(&self) -> Result<BytesMut> {
        let info_len = u32::try_from(self.block_info.len()).map_err(|_| Error::SizeLimitExceeded {
            what: "block info",
            size: self.block_info.len() as u64,
            limit: u32::MAX as u64,
        })?;

        let mut buf = BytesMut::with_capacity(HEADER_FIXED_SIZE + self.block_info.len());
        buf.put_slice(&EOP);
        buf.put_u64(self.min_key);
        buf.put_u64(self.max_key);
        buf.put_u32(self.bucket_factor);
        buf.put_slice(&self.data_hash);
        buf.put_slice(&self.index_hash);
        buf.put_slice(&self.block_info);
        buf.put_u32(info_len);
        buf.put_u32(self.data_len);
        buf.put_u32(self.index_len);
        Ok(buf)
    }

    /// Decode a full header.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_FIXED_SIZE {
            return Err(Error::corruption(format!("Header too short: {} bytes", data.len())));
        }
        if data[..EOP.len()] != EOP {
            return Err(Error::corruption("Header does not start with end-of-packet marker"));
        }

        let lengths = HeaderLengths::decode(&data[data.len() - LENGTHS_SIZE..])?;
        if lengths.header_size() != data.len() as u64 {
            return Err(Error::corruption(format!(
                "Header is {} bytes but its lengths describe {}",
                data.len(),
                lengths.header_size()
            )));
        }

        let mut buf = &data[EOP.len()..];
        let min_key = buf.get_u64();
        let max_key = buf.get_u64();
        let bucket_factor = buf.get_u32();
        let mut data_hash = [0u8; HASH_SIZE];
        buf.copy_to_slice(&mut data_hash);
        let mut index_hash = [0u8; HASH_SIZE];
        buf.copy_to_slice(&mut index_hash);
        let info_len = lengths.block_info_len as usize;
        let block_info = Bytes::copy_from_slice(&buf[..info_len]);

        if min_key > max_key {
            return Err(Error::corruption(format!("Key range inverted: {} > {}", min_key, max_key)));
        }
        if bucket_factor == 0 {
            return Err(Error::corruption("Bucket factor is zero"));
        }

        Ok(Self {
            min_key,
            max_key,
            bucket_factor,
            data_hash,
            index_hash,
            block_info,
            data_len: lengths.data_len,
            index_len: lengths.index_len,
        })
    }
}

/// Encode the trailer for a header with `header_hash`.
pub fn encode_trailer(header_hash: &[u8; HASH_SIZE]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(TRAILER_SIZE);
    buf.put_slice(header_hash);
    buf.put_u8(VERSION);
    buf.put_slice(header_hash);
    buf.put_slice(&SOP);
    buf
}

/// Decode a trailer, returning the header hash once marker, version and
/// both hash copies check out.
pub fn decode_trailer(data: &[u8]) -> Result<[u8; HASH_SIZE]> {
    if data.len() != TRAILER_SIZE {
        return Err(Error::corruption(format!("Trailer must be {} bytes", TRAILER_SIZE)));
    }
    if data[TRAILER_SIZE - SOP.len()..] != SOP {
        return Err(Error::corruption("Trailer does not end with start-of-packet marker"));
    }
    let version = data[HASH_SIZE];
    if version != VERSION {
        return Err(Error::corruption(format!("Unsupported sorted block version {}", version)));
    }
    let first = &data[..HASH_SIZE];
    let second = &data[HASH_SIZE + 1..HASH_SIZE + 1 + HASH_SIZE];
    if first != second {
        return Err(Error::corruption("Header hash copies disagree"));
    }

    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(first);
    Ok(hash)
}

/// Hash a header the way the trailer records it.
pub fn header_hash(header: &[u8]) -> [u8; HASH_SIZE] {
    md5(header)
}
