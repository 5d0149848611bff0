//! # Backscan - Append-Only Block Storage Read From the Tail
//!
//! Backscan stores self-describing blocks in append-only byte stores and
//! finds them again by scanning backward from the end. No external index is
//! kept: every block carries enough framing to be recognized in place.
//!
//! ## Architecture
//!
//! - **Store**: append-only byte stores with windowed reverse reads
//! - **Block**: typed header/body envelopes and a registry of block types
//! - **Blocks**: the append framing, backward scan, and consolidation engine
//! - **Sorted**: hashed, bucketed `u64 -> bytes` blocks with point lookups
//! - **Cache**: a blocks cache for scanned envelopes and an LRU read cache
//!
//! ## Example Usage
//!
//! ```rust
//! use backscan::{Blocks, ConcatBlock, MemoryStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), backscan::Error> {
//! let store = Arc::new(MemoryStore::new("example"));
//! let blocks = Blocks::new(store);
//!
//! blocks.append(&ConcatBlock::new(200, "h1", "b1"))?;
//! blocks.append(&ConcatBlock::new(200, "h2", "b2"))?;
//!
//! // Newest first
//! for item in blocks.iter() {
//!     let (block, _remaining) = item?;
//!     println!("{:?}", block.header()?);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod block;
pub mod blocks;
pub mod cache;
pub mod config;
pub mod error;
pub mod sorted;
pub mod store;

// Re-exports
pub use block::{Block, BlockRegistry, ConcatBlock, RawBlock, SkipBlock, SkipRange};
pub use blocks::{BlockIter, Blocks};
pub use cache::{BlocksCache, CachedStore, LocalBlocksCache, ReadCache};
pub use config::{CachePolicy, Options};
pub use error::{Error, Result};
pub use sorted::{DefragSummary, SortedBlock, Version1SortedBlocks};
pub use store::{AppendStore, FileStore, MemoryStore};
