//! Append-only byte stores read from the tail.
//!
//! Everything in this crate talks to storage through [`AppendStore`]: bytes
//! are only ever appended, and reads walk backward from a given offset in
//! store-chosen windows.
//!
//! ## Position conventions
//!
//! - `reverse_read(from)` returns a window ending at and including byte
//!   `from`, oldest byte first.
//! - `measured_reverse_read(end, start)` returns exactly the bytes of
//!   `[start, end)`, assembled from as many `reverse_read` windows as needed.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use bytes::{Bytes, BytesMut};

/// An append-only byte store with reverse-read access.
///
/// Implementations own their synchronization; all methods take `&self` so a
/// store can be shared through `Arc<dyn AppendStore>` between the block
/// engine and the lazily-resolved blocks it hands out.
pub trait AppendStore: Send + Sync {
    /// Stable identifier of this store (a path for file stores).
    fn id(&self) -> &str;

    /// Current length in bytes. Only ever grows.
    fn len(&self) -> u64;

    /// Whether nothing has been appended yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append bytes at the tail.
    fn append(&self, data: &[u8]) -> Result<()>;

    /// Read a window ending at and including `from_inclusive`.
    ///
    /// Returns `None` (or an empty buffer) past the end of the store.
    fn reverse_read(&self, from_inclusive: u64) -> Result<Option<Bytes>>;

    /// Read exactly the bytes of `[start, end)`.
    fn measured_reverse_read(&self, end: u64, start: u64) -> Result<Bytes> {
        measured_read(end, start, |from| self.reverse_read(from))
    }
}

/// Assemble `[start, end)` from backward windows produced by `read`.
///
/// Shared by the trait default and by stores that route windows through a
/// cache before falling back to the backing store.
pub(crate) fn measured_read<F>(end: u64, start: u64, mut read: F) -> Result<Bytes>
where
    F: FnMut(u64) -> Result<Option<Bytes>>,
{
    if start > end {
        return Err(Error::invalid_argument(format!(
            "measured read range is inverted: start {} > end {}",
            start, end
        )));
    }
    let wanted = (end - start) as usize;
    if wanted == 0 {
        return Ok(Bytes::new());
    }

    let mut chunks: Vec<Bytes> = Vec::new();
    let mut collected = 0usize;
    let mut cursor = end;
    while cursor > start {
        let window = match read(cursor - 1)? {
            Some(window) if !window.is_empty() => window,
            _ => break,
        };
        let usable = window.len().min((cursor - start) as usize);
        chunks.push(window.slice(window.len() - usable..));
        collected += usable;
        cursor -= usable as u64;
    }

    if collected != wanted {
        return Err(Error::corruption(format!(
            "store ran dry reading [{}, {}): got {} of {} bytes",
            start, end, collected, wanted
        )));
    }

    if chunks.len() == 1 {
        return Ok(chunks.pop().unwrap_or_default());
    }
    let mut buf = BytesMut::with_capacity(wanted);
    for chunk in chunks.iter().rev() {
        buf.extend_from_slice(chunk);
    }
    Ok(buf.freeze())
}
