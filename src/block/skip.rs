//! Skip marker left behind by consolidation.

use super::{Block, RawBlock};
use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::any::Any;

/// Type tag of skip blocks.
pub const SKIP_BLOCK_TYPE: u32 = 10;

/// Header size of a skip block: two big-endian u64 positions.
pub const SKIP_HEADER_SIZE: usize = 16;

/// An inclusive byte range a backward scan must jump over.
///
/// `from_inclusive` is the highest byte of the range, `to_inclusive` the lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipRange {
    /// Highest skipped byte.
    pub from_inclusive: u64,
    /// Lowest skipped byte.
    pub to_inclusive: u64,
}

impl SkipRange {
    /// Create a range, rejecting `from < to`.
    pub fn new(from_inclusive: u64, to_inclusive: u64) -> Result<Self> {
        if from_inclusive < to_inclusive {
            return Err(Error::invalid_argument(format!(
                "Skip range is inverted: from {} < to {}",
                from_inclusive, to_inclusive
            )));
        }
        Ok(Self { from_inclusive, to_inclusive })
    }

    /// Whether `position` falls inside the range.
    pub fn contains(&self, position: u64) -> bool {
        position >= self.to_inclusive && position <= self.from_inclusive
    }
}

/// System block recording a consolidated range.
#[derive(Debug, Clone)]
pub struct SkipBlock {
    range: SkipRange,
    position: Option<u64>,
    header: Bytes,
}

impl SkipBlock {
    /// Build an in-memory skip block for `[to_inclusive, from_inclusive]`.
    pub fn new(from_inclusive: u64, to_inclusive: u64) -> Result<Self> {
        let range = SkipRange::new(from_inclusive, to_inclusive)?;
        let mut header = BytesMut::with_capacity(SKIP_HEADER_SIZE);
        header.put_u64(range.from_inclusive);
        header.put_u64(range.to_inclusive);
        Ok(Self { range, position: None, header: header.freeze() })
    }

    /// Decode a skip block from a scanned envelope.
    pub fn from_raw(raw: &RawBlock) -> Result<Self> {
        if raw.block_type() != SKIP_BLOCK_TYPE {
            return Err(Error::TypeMismatch { expected: SKIP_BLOCK_TYPE, actual: raw.block_type() });
        }
        if raw.header_len() != SKIP_HEADER_SIZE as u64 {
            return Err(Error::corruption(format!(
                "Invalid skip block header length {}, must be {}",
                raw.header_len(),
                SKIP_HEADER_SIZE
            )));
        }
        if raw.body_len() != 0 {
            return Err(Error::corruption(format!(
                "Invalid skip block body length {}, must be 0",
                raw.body_len()
            )));
        }

        let header = raw.header()?;
        let mut buf = &header[..];
        let from_inclusive = buf.get_u64();
        let to_inclusive = buf.get_u64();
        let range = SkipRange::new(from_inclusive, to_inclusive)
            .map_err(|_| Error::corruption("Skip block range is inverted"))?;

        Ok(Self { range, position: raw.position(), header })
    }

    /// The skipped range.
    pub fn range(&self) -> SkipRange {
        self.range
    }
}

impl Block for SkipBlock {
    fn block_type(&self) -> u32 {
        SKIP_BLOCK_TYPE
    }

    fn position(&self) -> Option<u64> {
        self.position
    }

    fn header_len(&self) -> u64 {
        SKIP_HEADER_SIZE as u64
    }

    fn body_len(&self) -> u64 {
        0
    }

    fn header(&self) -> Result<Bytes> {
        Ok(self.header.clone())
    }

    fn body(&self) -> Result<Bytes> {
        Ok(Bytes::new())
    }

    fn merge(&self, _other: &dyn Block) -> Result<Box<dyn Block>> {
        Err(Error::SystemBlockNotMergeable(SKIP_BLOCK_TYPE))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
