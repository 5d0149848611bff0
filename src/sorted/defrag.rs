//! Rewrite a chain of sorted blocks as fewer, merged blocks.

use super::block::{SortedBlock, Version1SortedBlocks};
use crate::error::Result;
use crate::store::AppendStore;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a defrag run read and wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefragSummary {
    /// Source blocks replayed
    pub blocks_read: usize,
    /// Blocks appended to the destination
    pub blocks_written: usize,
    /// Bytes appended to the destination
    pub bytes_written: u64,
    /// Keys across all written blocks
    pub keys_written: usize,
}

/// Pending output of a defrag run.
struct Pending<'a> {
    destination: &'a dyn AppendStore,
    entries: BTreeMap<u64, Bytes>,
    info: Bytes,
    max_value_size: usize,
    summary: DefragSummary,
}

impl Pending<'_> {
    fn flush(&mut self) -> Result<()> {
        if self.entries.is_empty() {
            self.info = Bytes::new();
            return Ok(());
        }

        let written = Version1SortedBlocks::serialize(self.destination, &self.info, &self.entries, self.max_value_size)?;
        log::debug!("Defrag wrote block of {} keys ({} bytes)", self.entries.len(), written);

        self.summary.blocks_written += 1;
        self.summary.bytes_written += written;
        self.summary.keys_written += self.entries.len();
        self.entries.clear();
        self.info = Bytes::new();
        Ok(())
    }
}

impl Version1SortedBlocks {
    /// Replay every block below `offset` in `source`, oldest first, into
    /// `destination`.
    ///
    /// For each key of each block, `value_reduce(incoming, existing, info)`
    /// decides what the merged map holds; returning `None` drops the key.
    /// `info_reduce(accumulated, info)` folds block infos. After every
    /// replayed block `purge` sees the merged map and, by returning true,
    /// flushes it as one destination block. Whatever is left at the end is
    /// flushed too.
    ///
    /// Wrap `source` in a [`CachedStore`](crate::cache::CachedStore) to
    /// route reads through a read cache.
    pub fn defrag<P, V, I>(
        source: Arc<dyn AppendStore>,
        offset: u64,
        destination: &dyn AppendStore,
        mut purge: P,
        mut value_reduce: V,
        mut info_reduce: I,
        max_value_size: usize,
    ) -> Result<DefragSummary>
    where
        P: FnMut(&BTreeMap<u64, Bytes>) -> bool,
        V: FnMut(Bytes, Option<Bytes>, &Bytes) -> Option<Bytes>,
        I: FnMut(Bytes, &Bytes) -> Bytes,
    {
        let mut blocks: Vec<SortedBlock> = Self::blocks(source, offset, None).collect::<Result<_>>()?;
        let mut pending = Pending {
            destination,
            entries: BTreeMap::new(),
            info: Bytes::new(),
            max_value_size,
            summary: DefragSummary { blocks_read: blocks.len(), ..Default::default() },
        };

        // Collected newest first; pop to replay oldest first
        while let Some(block) = blocks.pop() {
            for entry in block.iterate() {
                let (key, incoming) = entry?;
                let existing = pending.entries.remove(&key);
                if let Some(value) = value_reduce(incoming, existing, block.block_info()) {
                    pending.entries.insert(key, value);
                }
            }

            let info = std::mem::take(&mut pending.info);
            pending.info = info_reduce(info, block.block_info());

            if purge(&pending.entries) {
                pending.flush()?;
            }
        }
        pending.flush()?;

        let summary = pending.summary;
        log::info!(
            "Defrag complete: {} blocks read, {} written, {} keys, {} bytes",
            summary.blocks_read,
            summary.blocks_written,
            summary.keys_written,
            summary.bytes_written
        );
        Ok(summary)
    }
}
