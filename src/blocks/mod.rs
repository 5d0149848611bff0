//! The blocks engine: append framing, backward discovery, consolidation.
//!
//! ## Appending
//!
//! `append` writes `body ++ header ++ preamble` in one store append. The
//! preamble carries lengths, type and a duplicated CRC16, and ends in the
//! start-of-block marker that backward scans anchor on.
//!
//! ## Scanning
//!
//! [`Blocks::iterate`] walks the store from its tail toward the scan floor,
//! looking for markers, validating preambles and yielding blocks newest
//! first. A marker whose preamble does not check out is a false positive and
//! the search continues below it, so garbage between blocks is tolerated.
//!
//! ## Consolidation
//!
//! [`Blocks::consolidate`] folds blocks newest to oldest with
//! [`Block::merge`], appends the merged result, and appends a [`SkipBlock`]
//! covering the consumed byte range. Later scans meet the skip block first
//! and jump over the range once they reach it.

mod iter;
pub mod preamble;

pub use iter::BlockIter;
pub use preamble::{Preamble, PREAMBLE_SIZE, SOB};

use crate::block::{is_system_type, Block, BlockRegistry, SkipBlock, SkipRange, MAX_UINT32, SYSTEM_BLOCKS_THRESHOLD};
use crate::cache::{BlocksCache, LocalBlocksCache};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::store::AppendStore;
use bytes::BytesMut;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

static EMPTY_REGISTRY: BlockRegistry = BlockRegistry::new();

/// A run of folded blocks and the byte range it replaces.
struct MergedGroup {
    block: Arc<dyn Block>,
    /// Exclusive end of the replaced range
    top: u64,
    /// Inclusive start of the replaced range
    bottom: u64,
}

/// Block engine over one append store.
///
/// All methods take `&self`; the skip list and cache carry their own locks.
/// A single writer is assumed.
pub struct Blocks {
    store: Arc<dyn AppendStore>,
    cache: Box<dyn BlocksCache>,
    options: Options,
    /// Sorted descending by `to_inclusive`. Only grows.
    skip_ranges: RwLock<Vec<SkipRange>>,
}

impl Blocks {
    /// Create an engine with default options and an in-memory blocks cache.
    pub fn new(store: Arc<dyn AppendStore>) -> Self {
        Self {
            store,
            cache: Box::new(LocalBlocksCache::new()),
            options: Options::default(),
            skip_ranges: RwLock::new(Vec::new()),
        }
    }

    /// Create an engine with `options`.
    pub fn with_options(store: Arc<dyn AppendStore>, options: Options) -> Result<Self> {
        Self::with_cache(store, Box::new(LocalBlocksCache::new()), options)
    }

    /// Create an engine with a caller-supplied blocks cache.
    pub fn with_cache(
        store: Arc<dyn AppendStore>,
        cache: Box<dyn BlocksCache>,
        options: Options,
    ) -> Result<Self> {
        options.validate()?;
        if options.scan_floor > store.len() {
            return Err(Error::invalid_argument(format!(
                "scan_floor {} is beyond store length {}",
                options.scan_floor,
                store.len()
            )));
        }
        Ok(Self { store, cache, options, skip_ranges: RwLock::new(Vec::new()) })
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn AppendStore> {
        &self.store
    }

    /// Engine options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn cache(&self) -> &dyn BlocksCache {
        self.cache.as_ref()
    }

    /// Number of block envelopes currently cached.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Skip ranges learned so far, highest first.
    pub fn skip_ranges(&self) -> Vec<SkipRange> {
        self.skip_ranges.read().clone()
    }

    /// Append a user block. Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for system block types
    /// - `SizeLimitExceeded` if header or body exceeds `u32::MAX` bytes
    pub fn append(&self, block: &dyn Block) -> Result<u64> {
        self.append_block(block, false)
    }

    fn append_block(&self, block: &dyn Block, allow_system: bool) -> Result<u64> {
        let block_type = block.block_type();
        if !allow_system && is_system_type(block_type) {
            return Err(Error::invalid_argument(format!(
                "Block type must be between {} and {}, got {}",
                SYSTEM_BLOCKS_THRESHOLD, MAX_UINT32, block_type
            )));
        }

        let header = block.header()?;
        let body = block.body()?;
        if header.len() as u64 > MAX_UINT32 {
            return Err(Error::SizeLimitExceeded {
                what: "header",
                size: header.len() as u64,
                limit: MAX_UINT32,
            });
        }
        if body.len() as u64 > MAX_UINT32 {
            return Err(Error::SizeLimitExceeded {
                what: "body",
                size: body.len() as u64,
                limit: MAX_UINT32,
            });
        }

        let preamble = Preamble::new(header.len() as u32, body.len() as u32, block_type).encode();
        let mut buf = BytesMut::with_capacity(body.len() + header.len() + PREAMBLE_SIZE);
        buf.extend_from_slice(&body);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&preamble);

        self.store.append(&buf)?;
        Ok(buf.len() as u64)
    }

    /// Scan backward, adapting blocks through `registry`.
    pub fn iterate<'a>(&'a self, registry: &'a BlockRegistry) -> BlockIter<'a> {
        BlockIter::new(self, registry)
    }

    /// Scan backward, yielding every user block as a plain envelope.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter::new(self, &EMPTY_REGISTRY)
    }

    /// Merge every block in the store into one.
    ///
    /// Returns false, writing nothing, if the store holds at most one block.
    pub fn consolidate(&self, registry: &BlockRegistry) -> Result<bool> {
        self.consolidate_with(registry, |_| false)
    }

    /// Merge blocks newest to oldest, starting a new merged block each time
    /// `should_purge` returns true for the running result.
    ///
    /// Each merged block is appended with a skip block covering the range it
    /// replaces. Groups are written oldest first so later scans still see the
    /// newest data first. The blocks cache is cleared afterwards.
    pub fn consolidate_with<F>(&self, registry: &BlockRegistry, mut should_purge: F) -> Result<bool>
    where
        F: FnMut(&dyn Block) -> bool,
    {
        let floor = self.options.scan_floor;
        let mut groups: Vec<MergedGroup> = Vec::new();
        let mut merged: Option<Arc<dyn Block>> = None;
        let mut top = self.store.len();
        let mut blocks_read = 0usize;

        for item in self.iterate(registry) {
            let (block, remaining) = item?;
            blocks_read += 1;

            let folded: Arc<dyn Block> = match merged.take() {
                None => block,
                Some(acc) => Arc::from(acc.merge(block.as_ref())?),
            };

            if should_purge(folded.as_ref()) {
                let bottom = floor + remaining;
                groups.push(MergedGroup { block: folded, top, bottom });
                top = bottom;
            } else {
                merged = Some(folded);
            }
        }

        match merged {
            Some(block) => groups.push(MergedGroup { block, top, bottom: floor }),
            // Whatever lies below the oldest block holds no blocks
            None => {
                if let Some(last) = groups.last_mut() {
                    last.bottom = floor;
                }
            }
        }

        if blocks_read <= 1 {
            log::debug!("Nothing to consolidate ({} block(s))", blocks_read);
            return Ok(false);
        }

        let mut bytes_written = 0u64;
        for group in groups.iter().rev() {
            bytes_written += self.append_block(group.block.as_ref(), false)?;
            let skip = SkipBlock::new(group.top - 1, group.bottom)?;
            bytes_written += self.append_block(&skip, true)?;
        }
        self.cache.clear(None, None);

        log::info!(
            "Consolidated {} blocks into {} ({} bytes written)",
            blocks_read,
            groups.len(),
            bytes_written
        );
        Ok(true)
    }

    /// Move a scan cursor below any skip range containing the byte under it.
    ///
    /// `cursor` is the exclusive end of the unscanned region; the result is
    /// stable, so chained or nested ranges are all jumped.
    pub fn skip_position(&self, mut cursor: u64) -> u64 {
        let ranges = self.skip_ranges.read();
        while cursor > 0 {
            match ranges.iter().find(|range| range.contains(cursor - 1)) {
                Some(range) => cursor = range.to_inclusive,
                None => break,
            }
        }
        cursor
    }

    /// Lowest offset a window read below `cursor` may reach: the scan floor
    /// or the byte above the nearest skip range, whichever is higher.
    pub(crate) fn scan_lower_bound(&self, cursor: u64) -> u64 {
        self.skip_ranges
            .read()
            .iter()
            .filter(|range| range.from_inclusive < cursor)
            .map(|range| range.from_inclusive + 1)
            .fold(self.options.scan_floor, u64::max)
    }

    pub(crate) fn register_skip_range(&self, range: SkipRange) {
        let mut ranges = self.skip_ranges.write();
        if ranges.contains(&range) {
            return;
        }
        log::debug!("Registered skip range [{}, {}]", range.to_inclusive, range.from_inclusive);
        ranges.push(range);
        ranges.sort_by(|a, b| b.to_inclusive.cmp(&a.to_inclusive));
    }
}

impl fmt::Debug for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocks")
            .field("store", &self.store.id())
            .field("cache", &self.cache)
            .field("options", &self.options)
            .field("skip_ranges", &self.skip_ranges.read())
            .finish()
    }
}
