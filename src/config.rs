//! Configuration options for the backscan block store.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// How the [`Blocks`](crate::blocks::Blocks) engine memoizes scanned blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CachePolicy {
    /// Cache every discovered block envelope (positions and lengths only).
    #[default]
    Default,
    /// Never cache; every scan re-reads preambles from the store.
    None,
    /// Cache every discovered block envelope.
    All,
}

impl CachePolicy {
    /// Whether scanned blocks should be stored in the blocks cache.
    pub fn caches_blocks(&self) -> bool {
        !matches!(self, CachePolicy::None)
    }
}

/// Configuration options for opening a block store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Block cache policy used while scanning.
    /// Default: CachePolicy::Default
    pub cache_policy: CachePolicy,

    /// Lowest store offset a backward scan will visit.
    /// Default: 0
    pub scan_floor: u64,

    /// Largest value accepted by sorted-block serialization.
    /// Default: 1MB
    pub max_value_size: usize,

    /// Byte capacity of the read-through cache.
    /// Set to 0 to disable caching.
    /// Default: 8MB
    pub read_cache_capacity: usize,

    /// Maximum number of windows held by the read-through cache.
    /// Default: 1000
    pub read_cache_max_entries: usize,

    /// Windows of this many bytes or fewer are never cached.
    /// Default: 3
    pub read_cache_min_entry_bytes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::Default,
            scan_floor: 0,
            max_value_size: 1024 * 1024, // 1MB
            read_cache_capacity: 8 * 1024 * 1024, // 8MB
            read_cache_max_entries: 1000,
            read_cache_min_entry_bytes: 3,
        }
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Sets the scan floor.
    pub fn scan_floor(mut self, offset: u64) -> Self {
        self.scan_floor = offset;
        self
    }

    /// Sets the maximum sorted-block value size.
    pub fn max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = size;
        self
    }

    /// Sets the read-through cache capacity in bytes.
    pub fn read_cache_capacity(mut self, size: usize) -> Self {
        self.read_cache_capacity = size;
        self
    }

    /// Sets the maximum number of cached read windows.
    pub fn read_cache_max_entries(mut self, entries: usize) -> Self {
        self.read_cache_max_entries = entries;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_value_size == 0 {
            return Err(Error::invalid_argument("max_value_size must be > 0"));
        }
        if self.max_value_size as u64 > u32::MAX as u64 {
            return Err(Error::invalid_argument("max_value_size must fit in 32 bits"));
        }
        if self.read_cache_min_entry_bytes == 0 {
            return Err(Error::invalid_argument("read_cache_min_entry_bytes must be > 0"));
        }
        Ok(())
    }

    /// Parses options from JSON, filling absent fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Options = serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("invalid options: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    /// Serializes the options to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::invalid_argument(format!("cannot encode options: {}", e)))
    }
}
