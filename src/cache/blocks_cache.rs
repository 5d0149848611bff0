use crate::block::RawBlock;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Position to block-envelope memo used by the scan.
///
/// Keys are block positions (exclusive end of the header). Implementations
/// never evict on their own; the engine clears them after consolidation
/// because cached positions inside a consolidated range are stale.
pub trait BlocksCache: fmt::Debug + Send + Sync {
    /// Remember `block` at `position`.
    fn set(&self, position: u64, block: RawBlock);

    /// Look up the block at `position`.
    fn get(&self, position: u64) -> Option<RawBlock>;

    /// Drop entries.
    ///
    /// With no hints everything goes. `before` drops positions below it,
    /// `after` drops positions above it.
    fn clear(&self, before: Option<u64>, after: Option<u64>);

    /// Number of cached blocks.
    fn len(&self) -> usize;

    /// Whether nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-memory [`BlocksCache`].
#[derive(Default)]
pub struct LocalBlocksCache {
    entries: RwLock<HashMap<u64, RawBlock>>,
}

impl LocalBlocksCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for LocalBlocksCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBlocksCache").field("len", &self.len()).finish()
    }
}

impl BlocksCache for LocalBlocksCache {
    fn set(&self, position: u64, block: RawBlock) {
        self.entries.write().insert(position, block);
    }

    fn get(&self, position: u64) -> Option<RawBlock> {
        self.entries.read().get(&position).cloned()
    }

    fn clear(&self, before: Option<u64>, after: Option<u64>) {
        let mut entries = self.entries.write();
        if before.is_none() && after.is_none() {
            entries.clear();
            return;
        }
        entries.retain(|&position, _| {
            let below = before.is_some_and(|b| position < b);
            let above = after.is_some_and(|a| position > a);
            !(below || above)
        });
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }
}
