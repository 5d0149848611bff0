//! Sorted key/value blocks.
//!
//! A sorted block stores a `u64 -> bytes` map so single keys can be read
//! without loading the block. Keys are grouped into buckets of
//! [`BUCKET_FACTOR`] consecutive keys; each bucket is a [`SortedSection`]
//! and the buckets themselves are indexed by an outer section keyed by
//! bucket start.
//!
//! ## On-disk layout
//!
//! ```text
//! [values region][outer index][header][trailer]
//! ```
//!
//! - values region: bucket blobs, each `values ++ index ++ indexLen(4) ++ valuesLen(4)`
//! - outer index: bucket start to blob offset entries
//! - header: key range, bucket width, MD5 of both regions, block info, lengths
//! - trailer: header MD5, version, header MD5 again, start-of-packet marker
//!
//! Blocks chain backward: each block's first byte is where the scan for the
//! previous one starts.

pub mod block;
pub mod defrag;
pub mod header;
pub mod section;

pub use block::{SortedBlock, SortedBlockChain, SortedEntries, Version1SortedBlocks};
pub use defrag::DefragSummary;
pub use header::SortedBlockHeader;
pub use section::{SectionBuffers, SectionUsage, SortedSection};

use md5::{Digest, Md5};

/// Start-of-packet marker: bytes 0..4 of `MD5("16111987")`.
pub const SOP: [u8; 4] = [0x50, 0x92, 0x24, 0x27];

/// End-of-packet marker: bytes 12..16 of `MD5("16111987")`.
pub const EOP: [u8; 4] = [0x2a, 0xcb, 0xbc, 0x10];

/// Format version written in every trailer.
pub const VERSION: u8 = 1;

/// Width of a key bucket.
pub const BUCKET_FACTOR: u32 = 1024;

pub(crate) fn md5(data: &[u8]) -> [u8; 16] {
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&Md5::digest(data));
    hash
}
