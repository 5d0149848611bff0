//! Block envelopes and the type registry.
//!
//! A block is one framed unit in an append store: a type tag, a header and a
//! body. Blocks are either built in memory before an append, or resolved
//! lazily from a store position found during a backward scan, in which case
//! the header and body bytes are only read when asked for.
//!
//! ## Layout in the store
//!
//! ```text
//! [body][header][preamble: 18 bytes]
//!               ^ position
//! ```
//!
//! A block's `position` is the exclusive end of its header, which is also
//! where its preamble starts.
//!
//! Types below [`SYSTEM_BLOCKS_THRESHOLD`] are reserved for framing blocks
//! such as [`SkipBlock`]; callers of the scan never see them.

pub mod concat;
pub mod skip;

pub use concat::ConcatBlock;
pub use skip::{SkipBlock, SkipRange, SKIP_BLOCK_TYPE};

use crate::error::{Error, Result};
use crate::store::AppendStore;
use bytes::Bytes;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Largest header length, body length or type a preamble can carry.
pub const MAX_UINT32: u64 = u32::MAX as u64;

/// Types below this value are system blocks.
pub const SYSTEM_BLOCKS_THRESHOLD: u32 = 100;

/// Whether `block_type` is reserved for internal framing.
pub fn is_system_type(block_type: u32) -> bool {
    block_type < SYSTEM_BLOCKS_THRESHOLD
}

/// A typed block that can be appended to and discovered in a store.
pub trait Block: fmt::Debug + Send + Sync {
    /// Type tag written into the preamble.
    fn block_type(&self) -> u32;

    /// Exclusive end of the header in the store, `None` for in-memory blocks.
    fn position(&self) -> Option<u64>;

    /// Header length in bytes.
    fn header_len(&self) -> u64;

    /// Body length in bytes.
    fn body_len(&self) -> u64;

    /// Header bytes.
    fn header(&self) -> Result<Bytes>;

    /// Body bytes.
    fn body(&self) -> Result<Bytes>;

    /// Merge `other` (an older block) into this one, producing a new block.
    ///
    /// Block types that support consolidation override this.
    fn merge(&self, other: &dyn Block) -> Result<Box<dyn Block>> {
        Err(Error::not_implemented(format!(
            "Block({}) does not support merging with Block({})",
            self.block_type(),
            other.block_type()
        )))
    }

    /// Access to the concrete type, for callers that registered their own.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone)]
enum Source {
    Memory { header: Bytes, body: Bytes },
    Store(Arc<dyn AppendStore>),
}

/// The generic block envelope.
///
/// In-memory envelopes carry their bytes; store-resolved envelopes carry
/// only lengths and read through the store on every `header()`/`body()` call.
/// Memoizing those reads is the engine's job, not the envelope's.
#[derive(Clone)]
pub struct RawBlock {
    block_type: u32,
    position: Option<u64>,
    header_len: u64,
    body_len: u64,
    source: Source,
}

impl RawBlock {
    /// Build an in-memory block. No store I/O.
    pub fn new(block_type: u32, header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        let header = header.into();
        let body = body.into();
        Self {
            block_type,
            position: None,
            header_len: header.len() as u64,
            body_len: body.len() as u64,
            source: Source::Memory { header, body },
        }
    }

    /// Describe a block that lives in `store`, without reading it.
    ///
    /// `position` is the exclusive end of the header; the whole block must
    /// fit between the start of the store and its current length.
    pub fn resolve_from(
        store: Arc<dyn AppendStore>,
        block_type: u64,
        position: u64,
        header_len: u64,
        body_len: u64,
    ) -> Result<Self> {
        if block_type > MAX_UINT32 {
            return Err(Error::invalid_argument(format!(
                "Parameter \"type\" has to be in range of 0 to {}, got {}",
                MAX_UINT32, block_type
            )));
        }
        if header_len > MAX_UINT32 {
            return Err(Error::invalid_argument(format!(
                "Parameter \"headerLength\" has to be in range of 0 to {}, got {}",
                MAX_UINT32, header_len
            )));
        }
        if body_len > MAX_UINT32 {
            return Err(Error::invalid_argument(format!(
                "Parameter \"bodyLength\" has to be in range of 0 to {}, got {}",
                MAX_UINT32, body_len
            )));
        }
        if header_len + body_len > position {
            return Err(Error::invalid_argument(format!(
                "Block of {} bytes cannot end at position {}",
                header_len + body_len,
                position
            )));
        }
        if position > store.len() {
            return Err(Error::invalid_argument(format!(
                "Parameter \"blockPosition\" {} is beyond store length {}",
                position,
                store.len()
            )));
        }

        Ok(Self {
            block_type: block_type as u32,
            position: Some(position),
            header_len,
            body_len,
            source: Source::Store(store),
        })
    }

    /// Id of the backing store, if resolved from one.
    pub fn store_id(&self) -> Option<&str> {
        match &self.source {
            Source::Store(store) => Some(store.id()),
            Source::Memory { .. } => None,
        }
    }

    /// First byte of the block (start of its body), if resolved from a store.
    pub fn start(&self) -> Option<u64> {
        self.position.map(|p| p - self.header_len - self.body_len)
    }
}

impl fmt::Debug for RawBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawBlock")
            .field("block_type", &self.block_type)
            .field("position", &self.position)
            .field("header_len", &self.header_len)
            .field("body_len", &self.body_len)
            .field("store", &self.store_id())
            .finish()
    }
}

impl Block for RawBlock {
    fn block_type(&self) -> u32 {
        self.block_type
    }

    fn position(&self) -> Option<u64> {
        self.position
    }

    fn header_len(&self) -> u64 {
        self.header_len
    }

    fn body_len(&self) -> u64 {
        self.body_len
    }

    fn header(&self) -> Result<Bytes> {
        match (&self.source, self.position) {
            (Source::Memory { header, .. }, _) => Ok(header.clone()),
            (Source::Store(store), Some(position)) => {
                store.measured_reverse_read(position, position - self.header_len)
            }
            (Source::Store(_), None) => Ok(Bytes::new()),
        }
    }

    fn body(&self) -> Result<Bytes> {
        match (&self.source, self.position) {
            (Source::Memory { body, .. }, _) => Ok(body.clone()),
            (Source::Store(store), Some(position)) => {
                let end = position - self.header_len;
                store.measured_reverse_read(end, end - self.body_len)
            }
            (Source::Store(_), None) => Ok(Bytes::new()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

type BlockFactory = Box<dyn Fn(RawBlock) -> Result<Arc<dyn Block>> + Send + Sync>;

/// Maps user block types to constructors.
///
/// Each scanned envelope is handed to the factory registered for its type;
/// unregistered types are surfaced as plain [`RawBlock`]s.
pub struct BlockRegistry {
    factories: BTreeMap<u32, BlockFactory>,
}

impl BlockRegistry {
    /// An empty registry.
    pub const fn new() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// Register `factory` for `block_type`, replacing any previous one.
    ///
    /// System types cannot be overridden.
    pub fn register<B, F>(&mut self, block_type: u32, factory: F) -> Result<&mut Self>
    where
        B: Block + 'static,
        F: Fn(RawBlock) -> Result<B> + Send + Sync + 'static,
    {
        if is_system_type(block_type) {
            return Err(Error::invalid_argument(format!(
                "Block type must be between {} and {}, got {}",
                SYSTEM_BLOCKS_THRESHOLD, MAX_UINT32, block_type
            )));
        }
        self.factories.insert(
            block_type,
            Box::new(move |raw| Ok(Arc::new(factory(raw)?) as Arc<dyn Block>)),
        );
        Ok(self)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<B, F>(mut self, block_type: u32, factory: F) -> Result<Self>
    where
        B: Block + 'static,
        F: Fn(RawBlock) -> Result<B> + Send + Sync + 'static,
    {
        self.register(block_type, factory)?;
        Ok(self)
    }

    /// Whether a factory is registered for `block_type`.
    pub fn contains(&self, block_type: u32) -> bool {
        self.factories.contains_key(&block_type)
    }

    /// Turn an envelope into its registered type.
    pub fn adapt(&self, raw: RawBlock) -> Result<Arc<dyn Block>> {
        match self.factories.get(&raw.block_type()) {
            Some(factory) => factory(raw),
            None => Ok(Arc::new(raw)),
        }
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BlockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockRegistry")
            .field("types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
