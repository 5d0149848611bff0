//! A block type that merges by concatenation.

use super::{Block, RawBlock};
use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::any::Any;

/// Block whose merge appends the other block's header and body after its own.
///
/// Consolidation folds newest to oldest, so a run of `ConcatBlock`s collapses
/// into a single block with headers and bodies in newest-first order.
#[derive(Debug, Clone)]
pub struct ConcatBlock {
    inner: RawBlock,
}

impl ConcatBlock {
    /// Build an in-memory block.
    pub fn new(block_type: u32, header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self { inner: RawBlock::new(block_type, header, body) }
    }

    /// Wrap a scanned envelope. Suitable as a [`BlockRegistry`](super::BlockRegistry) factory.
    pub fn from_raw(raw: RawBlock) -> Result<Self> {
        Ok(Self { inner: raw })
    }

    /// The wrapped envelope.
    pub fn raw(&self) -> &RawBlock {
        &self.inner
    }
}

impl Block for ConcatBlock {
    fn block_type(&self) -> u32 {
        self.inner.block_type()
    }

    fn position(&self) -> Option<u64> {
        self.inner.position()
    }

    fn header_len(&self) -> u64 {
        self.inner.header_len()
    }

    fn body_len(&self) -> u64 {
        self.inner.body_len()
    }

    fn header(&self) -> Result<Bytes> {
        self.inner.header()
    }

    fn body(&self) -> Result<Bytes> {
        self.inner.body()
    }

    fn merge(&self, other: &dyn Block) -> Result<Box<dyn Block>> {
        if other.block_type() != self.block_type() {
            return Err(Error::TypeMismatch {
                expected: self.block_type(),
                actual: other.block_type(),
            });
        }

        let mut header = BytesMut::with_capacity((self.header_len() + other.header_len()) as usize);
        header.extend_from_slice(&self.header()?);
        header.extend_from_slice(&other.header()?);

        let mut body = BytesMut::with_capacity((self.body_len() + other.body_len()) as usize);
        body.extend_from_slice(&self.body()?);
        body.extend_from_slice(&other.body()?);

        Ok(Box::new(ConcatBlock::new(self.block_type(), header.freeze(), body.freeze())))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
