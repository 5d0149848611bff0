//! Back-to-front key/value section builder.
//!
//! A section is a pair of buffers filled from their ends toward their
//! starts:
//!
//! ```text
//! index:  [key: u64][offset: u32] ... entry of the first key sits last
//! values: [value] ...                 value of the first key sits last
//! ```
//!
//! `offset` is the number of value bytes written before the entry's value,
//! so the first added value ends at the end of the values buffer. A reader
//! walking backward meets the first keys first.

use crate::error::{Error, Result};
use bytes::{Buf, Bytes};
use std::collections::HashSet;
use std::ops::Range;

/// Width of a key in the index.
pub const KEY_WIDTH: usize = 8;

/// Width of a value offset in the index.
pub const POINTER_WIDTH: usize = 4;

/// Size of one index entry.
pub const INDEX_ENTRY_SIZE: usize = KEY_WIDTH + POINTER_WIDTH;

/// Bytes consumed by one [`SortedSection::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionUsage {
    /// Index bytes written
    pub index_bytes: usize,
    /// Value bytes written
    pub payload_bytes: usize,
}

/// Finished section buffers.
#[derive(Debug, Clone)]
pub struct SectionBuffers {
    /// Index entries, last added first
    pub index: Bytes,
    /// Values, last added first
    pub values: Bytes,
}

/// Fixed-capacity section under construction.
#[derive(Debug)]
pub struct SortedSection {
    index: Vec<u8>,
    payload: Vec<u8>,
    /// Start of the written part of `index`
    index_cursor: usize,
    /// Start of the written part of `payload`
    payload_cursor: usize,
    keys: HashSet<u64>,
    max_value_size: usize,
}

impl SortedSection {
    /// Pre-size a section for `items` keys and `payload_capacity` value bytes.
    pub fn new(items: usize, payload_capacity: usize, max_value_size: usize) -> Self {
        let index_size = items * INDEX_ENTRY_SIZE;
        Self {
            index: vec![0u8; index_size],
            payload: vec![0u8; payload_capacity],
            index_cursor: index_size,
            payload_cursor: payload_capacity,
            keys: HashSet::with_capacity(items),
            max_value_size,
        }
    }

    /// Add `key` with `value`.
    ///
    /// # Errors
    ///
    /// - `DuplicateKey` if `key` was already added
    /// - `ValueTooLarge` if `value` exceeds the section's maximum
    /// - `SizeLimitExceeded` if the pre-sized buffers are full
    pub fn add(&mut self, key: u64, value: &[u8]) -> Result<SectionUsage> {
        if self.keys.contains(&key) {
            return Err(Error::DuplicateKey(key));
        }
        if value.len() > self.max_value_size {
            return Err(Error::ValueTooLarge { key, size: value.len(), max: self.max_value_size });
        }
        if self.index_cursor < INDEX_ENTRY_SIZE {
            return Err(Error::SizeLimitExceeded {
                what: "section index",
                size: (self.index.len() + INDEX_ENTRY_SIZE) as u64,
                limit: self.index.len() as u64,
            });
        }
        if self.payload_cursor < value.len() {
            return Err(Error::SizeLimitExceeded {
                what: "section payload",
                size: (self.payload.len() - self.payload_cursor + value.len()) as u64,
                limit: self.payload.len() as u64,
            });
        }

        let written = self.payload.len() - self.payload_cursor;
        let offset = u32::try_from(written).map_err(|_| Error::SizeLimitExceeded {
            what: "section payload",
            size: written as u64,
            limit: u32::MAX as u64,
        })?;

        let value_start = self.payload_cursor - value.len();
        self.payload[value_start..self.payload_cursor].copy_from_slice(value);
        self.payload_cursor = value_start;

        let entry_start = self.index_cursor - INDEX_ENTRY_SIZE;
        self.index[entry_start..entry_start + KEY_WIDTH].copy_from_slice(&key.to_be_bytes());
        self.index[entry_start + KEY_WIDTH..self.index_cursor].copy_from_slice(&offset.to_be_bytes());
        self.index_cursor = entry_start;

        self.keys.insert(key);
        Ok(SectionUsage { index_bytes: INDEX_ENTRY_SIZE, payload_bytes: value.len() })
    }

    /// Number of keys added.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key was added.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Hand out the written parts of both buffers. Single use.
    pub fn finish(self) -> SectionBuffers {
        SectionBuffers {
            index: Bytes::from(self.index).slice(self.index_cursor..),
            values: Bytes::from(self.payload).slice(self.payload_cursor..),
        }
    }

    /// Parse a finished index against a values buffer of `values_len` bytes.
    ///
    /// Returns `(key, range)` in the order keys were added, ranges relative
    /// to the start of the values buffer.
    pub fn parse_index(index: &[u8], values_len: u64) -> Result<Vec<(u64, Range<u64>)>> {
        if index.len() % INDEX_ENTRY_SIZE != 0 {
            return Err(Error::corruption(format!(
                "Section index of {} bytes is not a multiple of {}",
                index.len(),
                INDEX_ENTRY_SIZE
            )));
        }

        let mut stored = Vec::with_capacity(index.len() / INDEX_ENTRY_SIZE);
        let mut buf = index;
        while buf.has_remaining() {
            let key = buf.get_u64();
            let offset = buf.get_u32() as u64;
            if offset > values_len {
                return Err(Error::corruption(format!(
                    "Offset {} of key {} is beyond {} value bytes",
                    offset, key, values_len
                )));
            }
            stored.push((key, offset));
        }

        match stored.last() {
            Some(&(_, 0)) => {}
            Some(&(key, offset)) => {
                return Err(Error::corruption(format!(
                    "First value (key {}) starts at offset {}, expected 0",
                    key, offset
                )))
            }
            None if values_len == 0 => return Ok(Vec::new()),
            None => return Err(Error::corruption("Empty section index with non-empty values")),
        }

        let mut entries = Vec::with_capacity(stored.len());
        for position in (0..stored.len()).rev() {
            let (key, offset) = stored[position];
            let end = values_len - offset;
            let start = match position {
                0 => 0,
                _ => values_len - stored[position - 1].1,
            };
            if start > end {
                return Err(Error::corruption(format!("Value offsets of key {} are out of order", key)));
            }
            entries.push((key, start..end));
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_entry_layout() {
        let content = b"Hello World String";
        let mut section = SortedSection::new(1, content.len(), 1024);
        let usage = section.add(1, content).unwrap();
        assert_eq!(usage, SectionUsage { index_bytes: 12, payload_bytes: content.len() });

        let buffers = section.finish();
        assert_eq!(buffers.index.len(), INDEX_ENTRY_SIZE);
        assert_eq!(&buffers.index[0..8], &1u64.to_be_bytes());
        assert_eq!(&buffers.index[8..12], &0u32.to_be_bytes());
        assert_eq!(&buffers.values[..], content);
    }

    #[test]
    fn test_written_back_to_front() {
        let mut section = SortedSection::new(3, 6, 1024);
        section.add(10, b"a").unwrap();
        section.add(20, b"bb").unwrap();
        section.add(30, b"ccc").unwrap();

        let buffers = section.finish();
        assert_eq!(&buffers.values[..], b"cccbba");
        // Last added key sits at the lowest index offset
        assert_eq!(&buffers.index[0..8], &30u64.to_be_bytes());
        assert_eq!(&buffers.index[8..12], &3u32.to_be_bytes());
        assert_eq!(&buffers.index[24..32], &10u64.to_be_bytes());
        assert_eq!(&buffers.index[32..36], &0u32.to_be_bytes());

        let entries = SortedSection::parse_index(&buffers.index, buffers.values.len() as u64).unwrap();
        assert_eq!(entries, vec![(10, 5..6), (20, 3..5), (30, 0..3)]);
    }

    #[test]
    fn test_unused_capacity_is_trimmed() {
        let mut section = SortedSection::new(4, 100, 1024);
        section.add(1, b"xy").unwrap();
        let buffers = section.finish();
        assert_eq!(buffers.index.len(), INDEX_ENTRY_SIZE);
        assert_eq!(&buffers.values[..], b"xy");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut section = SortedSection::new(2, 100, 1024);
        section.add(1, b"a").unwrap();
        let err = section.add(1, b"b").unwrap_err();
        assert_eq!(err.to_string(), "Cannot add duplicate key 1, it already exists");
    }

    #[test]
    fn test_value_too_large() {
        let mut section = SortedSection::new(1, 100, 4);
        assert!(matches!(
            section.add(1, b"12345"),
            Err(Error::ValueTooLarge { key: 1, size: 5, max: 4 })
        ));
        assert!(section.is_empty());
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut section = SortedSection::new(1, 4, 1024);
        section.add(1, b"abcd").unwrap();
        assert!(matches!(section.add(2, b""), Err(Error::SizeLimitExceeded { .. })));

        let mut section = SortedSection::new(2, 4, 1024);
        section.add(1, b"abc").unwrap();
        assert!(matches!(section.add(2, b"de"), Err(Error::SizeLimitExceeded { .. })));
    }

    #[test]
    fn test_empty_values_allowed() {
        let mut section = SortedSection::new(2, 1, 1024);
        section.add(1, b"").unwrap();
        section.add(2, b"z").unwrap();
        let buffers = section.finish();
        let entries = SortedSection::parse_index(&buffers.index, buffers.values.len() as u64).unwrap();
        assert_eq!(entries, vec![(1, 1..1), (2, 0..1)]);
    }

    #[test]
    fn test_parse_index_rejects_garbage() {
        assert!(SortedSection::parse_index(&[0u8; 13], 0).is_err());

        let mut entry = Vec::new();
        entry.extend_from_slice(&1u64.to_be_bytes());
        entry.extend_from_slice(&7u32.to_be_bytes());
        assert!(SortedSection::parse_index(&entry, 5).is_err());
        assert!(SortedSection::parse_index(&[], 3).is_err());
        assert!(SortedSection::parse_index(&[], 0).unwrap().is_empty());
    }

    #[test]
    fn test_many_entries() {
        let count = 10_000u64;
        let value = b"Hello World String";
        let mut section = SortedSection::new(count as usize, value.len() * count as usize, 1024);
        for key in 0..count {
            section.add(key, value).unwrap();
        }
        assert_eq!(section.len(), count as usize);

        let buffers = section.finish();
        let entries = SortedSection::parse_index(&buffers.index, buffers.values.len() as u64).unwrap();
        assert_eq!(entries.len(), count as usize);
        for (expected, (key, range)) in entries.into_iter().enumerate() {
            assert_eq!(key, expected as u64);
            assert_eq!(&buffers.values[range.start as usize..range.end as usize], value);
        }
    }
}
