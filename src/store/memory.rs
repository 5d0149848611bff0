//! In-memory append store.

use super::AppendStore;
use crate::error::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default reverse-read window for in-memory stores.
pub const DEFAULT_WINDOW: usize = 4096;

type WindowFn = Box<dyn Fn() -> usize + Send + Sync>;

/// Append store backed by a growable in-memory buffer.
///
/// The size of each `reverse_read` window is chosen by a window function,
/// which makes it easy to exercise scanning with one-byte windows, random
/// windows, or whole-buffer reads.
pub struct MemoryStore {
    id: String,
    data: RwLock<Vec<u8>>,
    window: WindowFn,
    read_ops: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store with the default window size.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_window(id, DEFAULT_WINDOW)
    }

    /// Create an empty store that reads `window` bytes at a time.
    pub fn with_window(id: impl Into<String>, window: usize) -> Self {
        let window = window.max(1);
        Self::with_window_fn(id, move || window)
    }

    /// Create an empty store whose window size is drawn from `window` on every read.
    pub fn with_window_fn<F>(id: impl Into<String>, window: F) -> Self
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            data: RwLock::new(Vec::new()),
            window: Box::new(window),
            read_ops: AtomicU64::new(0),
        }
    }

    /// Create a store pre-populated with `bytes`.
    pub fn from_bytes(id: impl Into<String>, bytes: impl Into<Vec<u8>>, window: usize) -> Self {
        let store = Self::with_window(id, window);
        *store.data.write() = bytes.into();
        store
    }

    /// Copy of everything appended so far.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data.read())
    }

    /// Number of `reverse_read` calls served.
    pub fn read_ops(&self) -> u64 {
        self.read_ops.load(Ordering::Relaxed)
    }

    /// Reset the read counter.
    pub fn reset_read_ops(&self) {
        self.read_ops.store(0, Ordering::Relaxed);
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

impl AppendStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn append(&self, data: &[u8]) -> Result<()> {
        self.data.write().extend_from_slice(data);
        Ok(())
    }

    fn reverse_read(&self, from_inclusive: u64) -> Result<Option<Bytes>> {
        let data = self.data.read();
        if from_inclusive >= data.len() as u64 {
            return Ok(None);
        }
        self.read_ops.fetch_add(1, Ordering::Relaxed);

        let end = from_inclusive as usize + 1;
        let start = end.saturating_sub((self.window)().max(1));
        Ok(Some(Bytes::copy_from_slice(&data[start..end])))
    }
}
