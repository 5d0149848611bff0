//! Sorted block codec and lazy block handles.

use super::header::{
    decode_trailer, encode_trailer, header_hash, HeaderLengths, SortedBlockHeader, HEADER_FIXED_SIZE,
    LENGTHS_SIZE, TRAILER_SIZE,
};
use super::section::{SectionBuffers, SortedSection};
use super::{md5, BUCKET_FACTOR, SOP};
use crate::cache::{CachedStore, ReadCache};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::store::AppendStore;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Size of the `indexLen ++ valuesLen` suffix of a bucket blob.
const BUCKET_TRAILER_SIZE: u64 = 8;

/// Key to absolute byte range.
type KeyIndex = BTreeMap<u64, Range<u64>>;

fn to_u32(what: &'static str, size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| Error::SizeLimitExceeded {
        what,
        size: size as u64,
        limit: u32::MAX as u64,
    })
}

fn with_cache(store: Arc<dyn AppendStore>, cache: Option<Arc<ReadCache>>) -> Arc<dyn AppendStore> {
    match cache {
        Some(cache) => Arc::new(CachedStore::new(store, cache)),
        None => store,
    }
}

/// Version 1 sorted block codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Version1SortedBlocks;

impl Version1SortedBlocks {
    /// Serialize `payload` as one sorted block and append it to `store`.
    ///
    /// Returns the number of bytes appended.
    ///
    /// # Errors
    ///
    /// - `EmptyPayload` if `payload` is empty
    /// - `ValueTooLarge` if a value exceeds `max_value_size`
    /// - `SizeLimitExceeded` if a region outgrows its 32-bit length field
    pub fn serialize(
        store: &dyn AppendStore,
        block_info: &[u8],
        payload: &BTreeMap<u64, Bytes>,
        max_value_size: usize,
    ) -> Result<u64> {
        let (min_key, max_key) = match (payload.keys().next(), payload.keys().next_back()) {
            (Some(&min), Some(&max)) => (min, max),
            _ => return Err(Error::EmptyPayload),
        };

        let factor = BUCKET_FACTOR as u64;
        let mut buckets: BTreeMap<u64, Vec<(u64, &Bytes)>> = BTreeMap::new();
        for (&key, value) in payload {
            buckets.entry(key - key % factor).or_default().push((key, value));
        }

        let mut blobs = Vec::with_capacity(buckets.len());
        let mut data_size = 0usize;
        for (&bucket, entries) in &buckets {
            let payload_size = entries.iter().map(|(_, value)| value.len()).sum();
            let mut section = SortedSection::new(entries.len(), payload_size, max_value_size);
            for (key, value) in entries {
                section.add(*key, value)?;
            }

            let SectionBuffers { index, values } = section.finish();
            let mut blob = BytesMut::with_capacity(values.len() + index.len() + BUCKET_TRAILER_SIZE as usize);
            blob.put_slice(&values);
            blob.put_slice(&index);
            blob.put_u32(to_u32("bucket index", index.len())?);
            blob.put_u32(to_u32("bucket values", values.len())?);
            data_size += blob.len();
            blobs.push((bucket, blob.freeze()));
        }

        let mut outer = SortedSection::new(blobs.len(), data_size, usize::MAX);
        for (bucket, blob) in &blobs {
            outer.add(*bucket, blob)?;
        }
        let SectionBuffers { index, values } = outer.finish();

        let header = SortedBlockHeader {
            min_key,
            max_key,
            bucket_factor: BUCKET_FACTOR,
            data_hash: md5(&values),
            index_hash: md5(&index),
            block_info: Bytes::copy_from_slice(block_info),
            data_len: to_u32("data region", values.len())?,
            index_len: to_u32("index region", index.len())?,
        }
        .encode()?;
        let trailer = encode_trailer(&header_hash(&header));

        let mut buf = BytesMut::with_capacity(values.len() + index.len() + header.len() + trailer.len());
        buf.put_slice(&values);
        buf.put_slice(&index);
        buf.put_slice(&header);
        buf.put_slice(&trailer);
        store.append(&buf)?;

        log::debug!(
            "Serialized sorted block: {} keys in {} buckets, {} bytes",
            payload.len(),
            blobs.len(),
            buf.len()
        );
        Ok(buf.len() as u64)
    }

    /// [`serialize`](Self::serialize) with the value limit taken from `options`.
    pub fn serialize_with_options(
        store: &dyn AppendStore,
        block_info: &[u8],
        payload: &BTreeMap<u64, Bytes>,
        options: &Options,
    ) -> Result<u64> {
        options.validate()?;
        Self::serialize(store, block_info, payload, options.max_value_size)
    }

    /// Find the newest sorted block ending at or below `offset`.
    ///
    /// Candidates that fail any marker, version or hash check are skipped
    /// and the scan continues toward the start of the store. Returns `None`
    /// when nothing valid is found.
    pub fn deserialize(
        store: Arc<dyn AppendStore>,
        offset: u64,
        cache: Option<Arc<ReadCache>>,
    ) -> Result<Option<SortedBlock>> {
        locate(with_cache(store, cache), offset)
    }

    /// Walk the chain of blocks from `offset` toward the start, newest first.
    pub fn blocks(store: Arc<dyn AppendStore>, offset: u64, cache: Option<Arc<ReadCache>>) -> SortedBlockChain {
        SortedBlockChain { store: with_cache(store, cache), cursor: offset, finished: false }
    }
}

/// Scan backward from `offset` for a valid block.
fn locate(store: Arc<dyn AppendStore>, offset: u64) -> Result<Option<SortedBlock>> {
    let mut cursor = offset.min(store.len());
    // Bytes at [cursor, cursor + carry.len()) kept to catch split markers
    let mut carry = Bytes::new();

    while cursor > 0 {
        let read = match store.reverse_read(cursor - 1)? {
            Some(read) if !read.is_empty() => read,
            _ => break,
        };
        let window_start = cursor - read.len() as u64;
        let mut window = BytesMut::with_capacity(read.len() + carry.len());
        window.put_slice(&read);
        window.put_slice(&carry);

        for end in (SOP.len()..=window.len()).rev() {
            if window[end - SOP.len()..end] != SOP {
                continue;
            }
            if let Some(block) = candidate(&store, window_start + end as u64)? {
                return Ok(Some(block));
            }
        }

        let keep = window.len().min(SOP.len() - 1);
        carry = window.freeze().slice(..keep);
        cursor = window_start;
    }
    Ok(None)
}

/// Validate a block whose trailer ends at `end`.
fn candidate(store: &Arc<dyn AppendStore>, end: u64) -> Result<Option<SortedBlock>> {
    if end < (TRAILER_SIZE + HEADER_FIXED_SIZE) as u64 {
        return Ok(None);
    }

    let header_end = end - TRAILER_SIZE as u64;
    let trailer = store.measured_reverse_read(end, header_end)?;
    let hash = match decode_trailer(&trailer) {
        Ok(hash) => hash,
        Err(e) => {
            log::trace!("Rejected sorted block marker ending at {}: {}", end, e);
            return Ok(None);
        }
    };

    let lengths = HeaderLengths::decode(&store.measured_reverse_read(header_end, header_end - LENGTHS_SIZE as u64)?)?;
    if lengths.block_size() > header_end {
        log::trace!("Rejected sorted block ending at {}: {} bytes do not fit", end, lengths.block_size());
        return Ok(None);
    }

    let header_start = header_end - lengths.header_size();
    let header_bytes = store.measured_reverse_read(header_end, header_start)?;
    if header_hash(&header_bytes) != hash {
        log::warn!("Sorted block header at {} does not match its hash", header_start);
        return Ok(None);
    }
    let header = match SortedBlockHeader::decode(&header_bytes) {
        Ok(header) => header,
        Err(e) => {
            log::warn!("Sorted block header at {} is malformed: {}", header_start, e);
            return Ok(None);
        }
    };

    Ok(Some(SortedBlock::new(Arc::clone(store), header, header_start)))
}

/// Handle on one sorted block in a store.
///
/// Only the header is read up front. The outer index is loaded and checked
/// against its hash on first use; bucket indexes are loaded per bucket.
pub struct SortedBlock {
    store: Arc<dyn AppendStore>,
    header: SortedBlockHeader,
    header_start: u64,
    outer_index: Mutex<Option<Arc<KeyIndex>>>,
    buckets: Mutex<HashMap<u64, Arc<KeyIndex>>>,
}

impl SortedBlock {
    fn new(store: Arc<dyn AppendStore>, header: SortedBlockHeader, header_start: u64) -> Self {
        Self {
            store,
            header,
            header_start,
            outer_index: Mutex::new(None),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Parsed header.
    pub fn header(&self) -> &SortedBlockHeader {
        &self.header
    }

    /// Smallest key in the block.
    pub fn min_key(&self) -> u64 {
        self.header.min_key
    }

    /// Largest key in the block.
    pub fn max_key(&self) -> u64 {
        self.header.max_key
    }

    /// Caller metadata stored with the block.
    pub fn block_info(&self) -> &Bytes {
        &self.header.block_info
    }

    /// Start of the outer index region.
    pub fn index_start(&self) -> u64 {
        self.header_start - self.header.index_len as u64
    }

    /// First byte of the block, where the scan for the previous block starts.
    pub fn next_block_offset(&self) -> u64 {
        self.index_start() - self.header.data_len as u64
    }

    /// Exclusive end of the block.
    pub fn end(&self) -> u64 {
        self.header_start + HEADER_FIXED_SIZE as u64 + self.header.block_info.len() as u64 + TRAILER_SIZE as u64
    }

    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// `IntegrityMismatch` if the outer index does not match its hash.
    pub fn get(&self, key: u64) -> Result<Option<Bytes>> {
        if key < self.header.min_key || key > self.header.max_key {
            return Ok(None);
        }

        let bucket = key - key % self.header.bucket_factor as u64;
        let outer = self.outer_index()?;
        let range = match outer.get(&bucket) {
            Some(range) => range.clone(),
            None => return Ok(None),
        };

        let keys = self.bucket_index(bucket, &range)?;
        match keys.get(&key) {
            Some(range) => Ok(Some(self.store.measured_reverse_read(range.end, range.start)?)),
            None => Ok(None),
        }
    }

    /// Iterate every `(key, value)` in bucket-then-key order.
    pub fn iterate(&self) -> SortedEntries<'_> {
        SortedEntries { block: self, buckets: None, keys: VecDeque::new(), finished: false }
    }

    /// Re-read the values region and check it against its hash.
    pub fn verify(&self) -> Result<()> {
        let start = self.next_block_offset();
        let data = self.store.measured_reverse_read(self.index_start(), start)?;
        if md5(&data) != self.header.data_hash {
            log::warn!("Sorted block at {} failed data verification", start);
            return Err(Error::IntegrityMismatch { region: "data" });
        }
        Ok(())
    }

    /// The previous block in the chain, if any.
    pub fn next(&self) -> Result<Option<SortedBlock>> {
        match self.next_block_offset() {
            0 => Ok(None),
            offset => locate(Arc::clone(&self.store), offset),
        }
    }

    fn outer_index(&self) -> Result<Arc<KeyIndex>> {
        let mut slot = self.outer_index.lock();
        if let Some(index) = slot.as_ref() {
            return Ok(Arc::clone(index));
        }

        let start = self.index_start();
        let bytes = self.store.measured_reverse_read(self.header_start, start)?;
        if md5(&bytes) != self.header.index_hash {
            log::warn!("Sorted block index at {} does not match its hash", start);
            return Err(Error::IntegrityMismatch { region: "index" });
        }

        let base = self.next_block_offset();
        let index: KeyIndex = SortedSection::parse_index(&bytes, self.header.data_len as u64)?
            .into_iter()
            .map(|(bucket, range)| (bucket, base + range.start..base + range.end))
            .collect();
        let index = Arc::new(index);
        *slot = Some(Arc::clone(&index));
        Ok(index)
    }

    fn bucket_index(&self, bucket: u64, blob: &Range<u64>) -> Result<Arc<KeyIndex>> {
        if let Some(index) = self.buckets.lock().get(&bucket) {
            return Ok(Arc::clone(index));
        }

        let blob_len = blob.end - blob.start;
        if blob_len < BUCKET_TRAILER_SIZE {
            return Err(Error::corruption(format!("Bucket {} blob is only {} bytes", bucket, blob_len)));
        }
        let trailer = self.store.measured_reverse_read(blob.end, blob.end - BUCKET_TRAILER_SIZE)?;
        let mut buf = &trailer[..];
        let index_len = buf.get_u32() as u64;
        let values_len = buf.get_u32() as u64;
        if index_len + values_len + BUCKET_TRAILER_SIZE != blob_len {
            return Err(Error::corruption(format!(
                "Bucket {} lengths ({} + {}) do not match its {} byte blob",
                bucket, index_len, values_len, blob_len
            )));
        }

        let index_start = blob.start + values_len;
        let bytes = self.store.measured_reverse_read(index_start + index_len, index_start)?;
        let index: KeyIndex = SortedSection::parse_index(&bytes, values_len)?
            .into_iter()
            .map(|(key, range)| (key, blob.start + range.start..blob.start + range.end))
            .collect();

        let index = Arc::new(index);
        self.buckets.lock().insert(bucket, Arc::clone(&index));
        Ok(index)
    }
}

impl fmt::Debug for SortedBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedBlock")
            .field("store", &self.store.id())
            .field("header", &self.header)
            .field("header_start", &self.header_start)
            .finish()
    }
}

/// Entries of one sorted block, bucket by bucket.
pub struct SortedEntries<'a> {
    block: &'a SortedBlock,
    buckets: Option<VecDeque<(u64, Range<u64>)>>,
    keys: VecDeque<(u64, Range<u64>)>,
    finished: bool,
}

impl SortedEntries<'_> {
    fn advance(&mut self) -> Result<Option<(u64, Bytes)>> {
        if self.buckets.is_none() {
            let outer = self.block.outer_index()?;
            self.buckets = Some(outer.iter().map(|(bucket, range)| (*bucket, range.clone())).collect());
        }

        loop {
            if let Some((key, range)) = self.keys.pop_front() {
                let value = self.block.store.measured_reverse_read(range.end, range.start)?;
                return Ok(Some((key, value)));
            }

            let (bucket, blob) = match self.buckets.as_mut().and_then(VecDeque::pop_front) {
                Some(next) => next,
                None => return Ok(None),
            };
            let index = self.block.bucket_index(bucket, &blob)?;
            self.keys = index.iter().map(|(key, range)| (*key, range.clone())).collect();
        }
    }
}

impl Iterator for SortedEntries<'_> {
    type Item = Result<(u64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
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

/// Backward chain of sorted blocks, newest first.
pub struct SortedBlockChain {
    store: Arc<dyn AppendStore>,
    cursor: u64,
    finished: bool,
}

impl Iterator for SortedBlockChain {
    type Item = Result<SortedBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.cursor == 0 {
            return None;
        }
        match locate(Arc::clone(&self.store), self.cursor) {
            Ok(Some(block)) => {
                self.cursor = block.next_block_offset();
                Some(Ok(block))
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorted::EOP;
    use crate::store::MemoryStore;

    fn payload(entries: &[(u64, &'static [u8])]) -> BTreeMap<u64, Bytes> {
        entries.iter().map(|(k, v)| (*k, Bytes::from_static(v))).collect()
    }

    fn memory(window: usize) -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_window("sorted", window))
    }

    #[test]
    fn test_single_key_round_trip() {
        let store = memory(4096);
        let written =
            Version1SortedBlocks::serialize(store.as_ref(), b"info", &payload(&[(1, b"Hello World String")]), 1024)
                .unwrap();
        assert_eq!(written, store.len());

        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();
        assert_eq!(block.min_key(), 1);
        assert_eq!(block.max_key(), 1);
        assert_eq!(&block.block_info()[..], b"info");
        assert_eq!(block.next_block_offset(), 0);
        assert_eq!(block.end(), store.len());
        assert_eq!(&block.get(1).unwrap().unwrap()[..], b"Hello World String");
        assert!(block.get(2).unwrap().is_none());
        assert!(block.next().unwrap().is_none());
        block.verify().unwrap();
    }

    #[test]
    fn test_empty_payload_rejected() {
        let store = memory(4096);
        let result = Version1SortedBlocks::serialize(store.as_ref(), b"", &BTreeMap::new(), 1024);
        assert!(matches!(result, Err(Error::EmptyPayload)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_value_too_large_rejected() {
        let store = memory(4096);
        let result = Version1SortedBlocks::serialize(store.as_ref(), b"", &payload(&[(7, b"12345")]), 4);
        assert!(matches!(result, Err(Error::ValueTooLarge { key: 7, .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn test_serialize_with_options_limit() {
        let store = memory(4096);
        let options = Options::default().max_value_size(3);
        let result =
            Version1SortedBlocks::serialize_with_options(store.as_ref(), b"", &payload(&[(1, b"four")]), &options);
        assert!(matches!(result, Err(Error::ValueTooLarge { size: 4, max: 3, .. })));

        Version1SortedBlocks::serialize_with_options(store.as_ref(), b"", &payload(&[(1, b"ok")]), &options).unwrap();
        assert!(!store.is_empty());
    }

    #[test]
    fn test_keys_across_buckets() {
        let store = memory(64);
        let data = payload(&[(0, b"zero"), (1023, b"edge"), (1024, b"next"), (5000, b"far"), (u64::MAX, b"max")]);
        Version1SortedBlocks::serialize(store.as_ref(), b"", &data, 1024).unwrap();

        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();
        assert_eq!(block.min_key(), 0);
        assert_eq!(block.max_key(), u64::MAX);
        for (key, value) in &data {
            assert_eq!(block.get(*key).unwrap().as_ref(), Some(value), "key {}", key);
        }
        assert!(block.get(1025).unwrap().is_none());
        assert!(block.get(2048).unwrap().is_none());

        let entries: Vec<(u64, Bytes)> = block.iterate().collect::<Result<_>>().unwrap();
        let expected: Vec<(u64, Bytes)> = data.into_iter().collect();
        assert_eq!(entries, expected);
    }

    #[test]
    fn test_iterate_restarts() {
        let store = memory(4096);
        let data = payload(&[(3, b"c"), (1, b"a"), (2, b"b")]);
        Version1SortedBlocks::serialize(store.as_ref(), b"", &data, 1024).unwrap();
        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();

        let first: Vec<u64> = block.iterate().map(|e| e.unwrap().0).collect();
        let second: Vec<u64> = block.iterate().map(|e| e.unwrap().0).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_chain_of_blocks() {
        let store = memory(100);
        Version1SortedBlocks::serialize(store.as_ref(), b"first", &payload(&[(1, b"old")]), 1024).unwrap();
        let first_end = store.len();
        Version1SortedBlocks::serialize(store.as_ref(), b"second", &payload(&[(1, b"new")]), 1024).unwrap();

        let newest = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();
        assert_eq!(&newest.block_info()[..], b"second");
        assert_eq!(newest.next_block_offset(), first_end);

        let older = newest.next().unwrap().unwrap();
        assert_eq!(&older.block_info()[..], b"first");
        assert_eq!(&older.get(1).unwrap().unwrap()[..], b"old");
        assert!(older.next().unwrap().is_none());

        let infos: Vec<Bytes> = Version1SortedBlocks::blocks(store.clone(), store.len(), None)
            .map(|block| block.unwrap().block_info().clone())
            .collect();
        assert_eq!(infos, vec![Bytes::from_static(b"second"), Bytes::from_static(b"first")]);
    }

    #[test]
    fn test_header_hash_bit_flip_rejected() {
        let data = payload(&[(1, b"Hello World String")]);
        let reference = memory(4096);
        Version1SortedBlocks::serialize(reference.as_ref(), b"info", &data, 1024).unwrap();
        let bytes = reference.snapshot().to_vec();
        let len = bytes.len();

        // Both hash copies, one bit at a time
        let first_copy = len - TRAILER_SIZE..len - TRAILER_SIZE + 16;
        let second_copy = len - 20..len - 4;
        for byte in first_copy.chain(second_copy) {
            for bit in 0..8 {
                let mut corrupted = bytes.clone();
                corrupted[byte] ^= 1 << bit;
                let store = Arc::new(MemoryStore::from_bytes("flip", corrupted, 4096));
                let found = Version1SortedBlocks::deserialize(store, len as u64, None).unwrap();
                assert!(found.is_none(), "byte {} bit {}", byte, bit);
            }
        }
    }

    #[test]
    fn test_corrupt_index_is_integrity_error() {
        let data = payload(&[(1, b"a"), (2, b"b")]);
        let reference = memory(4096);
        Version1SortedBlocks::serialize(reference.as_ref(), b"", &data, 1024).unwrap();
        let block = Version1SortedBlocks::deserialize(reference.clone(), reference.len(), None).unwrap().unwrap();

        let mut bytes = reference.snapshot().to_vec();
        bytes[block.index_start() as usize] ^= 0xFF;
        let store = Arc::new(MemoryStore::from_bytes("bad-index", bytes, 4096));
        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();
        assert!(matches!(block.get(1), Err(Error::IntegrityMismatch { region: "index" })));
    }

    #[test]
    fn test_verify_detects_data_corruption() {
        let data = payload(&[(1, b"abcdef")]);
        let reference = memory(4096);
        Version1SortedBlocks::serialize(reference.as_ref(), b"", &data, 1024).unwrap();

        let mut bytes = reference.snapshot().to_vec();
        bytes[0] ^= 0xFF;
        let store = Arc::new(MemoryStore::from_bytes("bad-data", bytes, 4096));
        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();
        assert!(matches!(block.verify(), Err(Error::IntegrityMismatch { region: "data" })));
    }

    #[test]
    fn test_header_starts_with_eop() {
        let store = memory(4096);
        Version1SortedBlocks::serialize(store.as_ref(), b"", &payload(&[(9, b"v")]), 1024).unwrap();
        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), None).unwrap().unwrap();
        let bytes = store.snapshot();
        let start = block.index_start() as usize + block.header().index_len as usize;
        assert_eq!(&bytes[start..start + 4], &EOP);
    }

    #[test]
    fn test_read_cache_serves_repeat_lookups() {
        let store = memory(4096);
        let data: BTreeMap<u64, Bytes> = (0..100u64).map(|k| (k, Bytes::from(vec![k as u8; 10]))).collect();
        Version1SortedBlocks::serialize(store.as_ref(), b"", &data, 1024).unwrap();

        let cache = Arc::new(ReadCache::new(1024 * 1024));
        let block = Version1SortedBlocks::deserialize(store.clone(), store.len(), Some(cache.clone()))
            .unwrap()
            .unwrap();
        store.reset_read_ops();
        for key in 0..100u64 {
            assert_eq!(block.get(key).unwrap().unwrap(), data[&key]);
        }
        assert_eq!(store.read_ops(), 0);
        assert!(cache.stats().hits > 0);
    }
}
