//! Error types for the backscan block store.

use std::io;
use thiserror::Error;

/// The result type used throughout backscan.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for backscan operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error surfaced by the underlying append store.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A hashed region did not match the hash recorded in its header.
    #[error("Integrity mismatch in {region} region")]
    IntegrityMismatch {
        /// Which region failed verification (`index` or `data`).
        region: &'static str,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A length or size does not fit the on-disk field that carries it.
    #[error("{what} size {size} exceeds limit {limit}")]
    SizeLimitExceeded {
        /// What was being sized.
        what: &'static str,
        /// The offending size.
        size: u64,
        /// The maximum accepted size.
        limit: u64,
    },

    /// A sorted block cannot be built from an empty payload.
    #[error("Parameter \"payload\" cannot be empty")]
    EmptyPayload,

    /// The key was already added to a sorted section.
    #[error("Cannot add duplicate key {0}, it already exists")]
    DuplicateKey(u64),

    /// A value is larger than the configured maximum.
    #[error("Value for key {key} is {size} bytes, maximum is {max}")]
    ValueTooLarge {
        /// Key whose value was rejected.
        key: u64,
        /// Size of the rejected value.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A feature or function is not implemented for this block type.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Two blocks of different types cannot be merged.
    #[error("Block type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Type of the block being merged into.
        expected: u32,
        /// Type of the other block.
        actual: u32,
    },

    /// System blocks are structural and never merge.
    #[error("System block of type {0} cannot be merged")]
    SystemBlockNotMergeable(u32),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new not implemented error.
    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Error::NotImplemented(msg.into())
    }

    /// Whether this error reports on-disk corruption rather than misuse.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::IntegrityMismatch { .. })
    }
}
