//! Backward scan state machine.

use super::preamble::{Preamble, PREAMBLE_SIZE, SOB};
use super::Blocks;
use crate::block::{is_system_type, Block, BlockRegistry, RawBlock, SkipBlock, SKIP_BLOCK_TYPE};
use crate::error::Result;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Lazy backward scan over the blocks of a store.
///
/// Yields `(block, remaining)` newest first, where `remaining` is the number
/// of bytes between the scan floor and the start of the yielded block. One
/// scan cannot be restarted; call [`Blocks::iterate`] again for a fresh one.
///
/// After an error the scan is finished.
pub struct BlockIter<'a> {
    blocks: &'a Blocks,
    registry: &'a BlockRegistry,
    /// Exclusive end of the region not yet scanned
    cursor: u64,
    /// Lowest offset the current window may reach
    lower: u64,
    /// Bytes from `window_start` up to `cursor`, plus a carried byte when contiguous
    window: Bytes,
    window_start: u64,
    /// Marker candidates in `window` lie below this index
    search_limit: usize,
    /// First byte of the previous window, kept so a marker split across two
    /// windows is still found
    carry: Option<u8>,
    finished: bool,
}

impl<'a> BlockIter<'a> {
    pub(super) fn new(blocks: &'a Blocks, registry: &'a BlockRegistry) -> Self {
        Self {
            blocks,
            registry,
            cursor: blocks.store().len(),
            lower: blocks.options().scan_floor,
            window: Bytes::new(),
            window_start: 0,
            search_limit: 0,
            carry: None,
            finished: false,
        }
    }

    /// Exclusive end of the region not yet scanned.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    fn advance(&mut self) -> Result<Option<(Arc<dyn Block>, u64)>> {
        loop {
            let raw = match self.next_envelope()? {
                Some(raw) => raw,
                None => return Ok(None),
            };

            let block_type = raw.block_type();
            if is_system_type(block_type) {
                if block_type == SKIP_BLOCK_TYPE {
                    let skip = SkipBlock::from_raw(&raw)?;
                    self.blocks.register_skip_range(skip.range());
                } else {
                    log::debug!("Ignoring unknown system block type {} at {:?}", block_type, raw.position());
                }
                continue;
            }

            let remaining = self.cursor.saturating_sub(self.blocks.options().scan_floor);
            return Ok(Some((self.registry.adapt(raw)?, remaining)));
        }
    }

    /// Find the next valid block envelope below the cursor.
    fn next_envelope(&mut self) -> Result<Option<RawBlock>> {
        loop {
            while let Some(index) = self.next_marker() {
                let marker = self.window_start + index as u64;
                if let Some(raw) = self.candidate(marker)? {
                    if let Some(start) = raw.start() {
                        self.cursor = start;
                    }
                    self.window = Bytes::new();
                    self.search_limit = 0;
                    self.carry = None;
                    return Ok(Some(raw));
                }
            }

            if !self.window.is_empty() {
                self.cursor = self.window_start;
                self.carry = Some(self.window[0]);
                self.window = Bytes::new();
            }
            if !self.refill()? {
                return Ok(None);
            }
        }
    }

    /// Scan the current window backward for the next marker.
    fn next_marker(&mut self) -> Option<usize> {
        while self.search_limit > 0 {
            self.search_limit -= 1;
            let index = self.search_limit;
            if self.window[index] == SOB[0] && self.window[index + 1] == SOB[1] {
                return Some(index);
            }
        }
        None
    }

    /// Read the next window below the cursor. Returns false when the scan is over.
    fn refill(&mut self) -> Result<bool> {
        let skipped = self.blocks.skip_position(self.cursor);
        if skipped != self.cursor {
            log::trace!("Skipping consolidated range [{}, {})", skipped, self.cursor);
            self.cursor = skipped;
            self.carry = None;
        }

        self.lower = self.blocks.scan_lower_bound(self.cursor);
        if self.cursor <= self.lower {
            return Ok(false);
        }

        let read = match self.blocks.store().reverse_read(self.cursor - 1)? {
            Some(read) if !read.is_empty() => read,
            _ => return Ok(false),
        };

        let keep = (read.len() as u64).min(self.cursor - self.lower) as usize;
        let read = read.slice(read.len() - keep..);
        self.window_start = self.cursor - keep as u64;
        self.window = match self.carry.take() {
            Some(byte) => {
                let mut buf = BytesMut::with_capacity(keep + 1);
                buf.put_slice(&read);
                buf.put_u8(byte);
                buf.freeze()
            }
            None => read,
        };
        self.search_limit = self.window.len().saturating_sub(1);
        Ok(true)
    }

    /// Validate a marker found at `marker` and resolve the block it ends.
    fn candidate(&self, marker: u64) -> Result<Option<RawBlock>> {
        let preamble_end = marker + SOB.len() as u64;
        if preamble_end < self.lower + PREAMBLE_SIZE as u64 {
            log::trace!("Marker at {} leaves no room for a preamble", marker);
            return Ok(None);
        }
        let position = preamble_end - PREAMBLE_SIZE as u64;

        if let Some(raw) = self.blocks.cache().get(position) {
            if raw.start().is_some_and(|start| start >= self.lower) {
                return Ok(Some(raw));
            }
        }

        let bytes = self.blocks.store().measured_reverse_read(preamble_end, position)?;
        let preamble = match Preamble::decode(&bytes) {
            Ok(preamble) => preamble,
            Err(e) => {
                log::trace!("Rejected marker at {}: {}", marker, e);
                return Ok(None);
            }
        };
        if preamble.span() > position - self.lower {
            log::trace!(
                "Rejected marker at {}: block of {} bytes runs past offset {}",
                marker,
                preamble.span(),
                self.lower
            );
            return Ok(None);
        }

        let raw = RawBlock::resolve_from(
            Arc::clone(self.blocks.store()),
            preamble.block_type as u64,
            position,
            preamble.header_len as u64,
            preamble.body_len as u64,
        )?;
        log::debug!(
            "Found block type {} at {} (header {}, body {})",
            preamble.block_type,
            position,
            preamble.header_len,
            preamble.body_len
        );

        if self.blocks.options().cache_policy.caches_blocks() {
            self.blocks.cache().set(position, raw.clone());
        }
        Ok(Some(raw))
    }
}

impl Iterator for BlockIter<'_> {
    type Item = Result<(Arc<dyn Block>, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
