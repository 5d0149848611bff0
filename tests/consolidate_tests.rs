// Consolidation tests
// Tests for merging runs of blocks and skipping the ranges they replace

use backscan::{AppendStore, Block, BlockRegistry, Blocks, ConcatBlock, Error, MemoryStore};
use std::sync::Arc;

const TYPE: u32 = 200;

fn registry() -> BlockRegistry {
    BlockRegistry::new().with(TYPE, ConcatBlock::from_raw).unwrap()
}

fn append_numbered(blocks: &Blocks, range: std::ops::RangeInclusive<u32>) {
    for i in range {
        blocks.append(&ConcatBlock::new(TYPE, format!("H{}", i), format!("B{}", i))).unwrap();
    }
}

fn scan(blocks: &Blocks, registry: &BlockRegistry) -> Vec<(String, String)> {
    blocks
        .iterate(registry)
        .map(|item| {
            let (block, _) = item.unwrap();
            (
                String::from_utf8(block.header().unwrap().to_vec()).unwrap(),
                String::from_utf8(block.body().unwrap().to_vec()).unwrap(),
            )
        })
        .collect()
}

fn pair(header: &str, body: &str) -> (String, String) {
    (header.to_string(), body.to_string())
}

/// Three blocks collapse into one, newest first
#[test]
fn test_consolidate_three_blocks() {
    env_logger::try_init().ok();

    let store = Arc::new(MemoryStore::new("three"));
    let blocks = Blocks::new(store.clone());
    let registry = registry();
    append_numbered(&blocks, 1..=3);

    assert!(blocks.consolidate(&registry).unwrap());
    assert_eq!(scan(&blocks, &registry), vec![pair("H3H2H1", "B3B2B1")]);
    assert_eq!(blocks.skip_ranges().len(), 1);

    // A fresh engine learns the skip range from the store
    let reopened = Blocks::new(store);
    assert_eq!(scan(&reopened, &registry), vec![pair("H3H2H1", "B3B2B1")]);
}

/// Consolidating again folds new blocks into the earlier result
#[test]
fn test_consolidate_twice() {
    env_logger::try_init().ok();

    let store = Arc::new(MemoryStore::with_window("twice", 11));
    let blocks = Blocks::new(store.clone());
    let registry = registry();

    append_numbered(&blocks, 1..=2);
    assert!(blocks.consolidate(&registry).unwrap());
    append_numbered(&blocks, 3..=4);
    assert!(blocks.consolidate(&registry).unwrap());

    assert_eq!(scan(&blocks, &registry), vec![pair("H4H3H2H1", "B4B3B2B1")]);
    assert_eq!(scan(&Blocks::new(store), &registry), vec![pair("H4H3H2H1", "B4B3B2B1")]);
}

/// `should_purge` splits the output into groups that keep their order
#[test]
fn test_consolidate_with_purge() {
    env_logger::try_init().ok();

    let store = Arc::new(MemoryStore::with_window("purge", 5));
    let blocks = Blocks::new(store.clone());
    let registry = registry();
    append_numbered(&blocks, 1..=4);

    let consolidated = blocks
        .consolidate_with(&registry, |merged| merged.body_len() >= 4)
        .unwrap();
    assert!(consolidated);

    let expected = vec![pair("H4H3", "B4B3"), pair("H2H1", "B2B1")];
    assert_eq!(scan(&blocks, &registry), expected);
    assert_eq!(scan(&Blocks::new(store), &registry), expected);
}

/// Nothing is written when there is at most one block
#[test]
fn test_consolidate_nothing_to_merge() {
    let store = Arc::new(MemoryStore::new("single"));
    let blocks = Blocks::new(store.clone());
    let registry = registry();

    assert!(!blocks.consolidate(&registry).unwrap());
    append_numbered(&blocks, 1..=1);
    let len = store.len();
    assert!(!blocks.consolidate(&registry).unwrap());
    assert_eq!(store.len(), len);
}

/// Garbage inside the consolidated range is skipped with the blocks
#[test]
fn test_consolidate_skips_garbage() {
    env_logger::try_init().ok();

    let store = Arc::new(MemoryStore::with_window("garbage", 3));
    store.append(b"I am #!pre Garbage#!").unwrap();
    let blocks = Blocks::new(store.clone());
    let registry = registry();
    append_numbered(&blocks, 1..=2);
    store.append(b"I am #!post Garbage#!").unwrap();
    append_numbered(&blocks, 3..=3);

    assert!(blocks.consolidate(&registry).unwrap());
    assert_eq!(scan(&Blocks::new(store), &registry), vec![pair("H3H2H1", "B3B2B1")]);
}

/// The blocks cache is emptied after consolidation
#[test]
fn test_consolidate_clears_cache() {
    let store = Arc::new(MemoryStore::new("cache"));
    let blocks = Blocks::new(store);
    let registry = registry();
    append_numbered(&blocks, 1..=3);

    assert_eq!(scan(&blocks, &registry).len(), 3);
    assert_eq!(blocks.cache_len(), 3);

    blocks.consolidate(&registry).unwrap();
    assert_eq!(blocks.cache_len(), 0);
}

/// Blocks without a merge rule cannot be consolidated
#[test]
fn test_consolidate_unregistered_type_fails() {
    let store = Arc::new(MemoryStore::new("raw"));
    let blocks = Blocks::new(store.clone());
    append_numbered(&blocks, 1..=2);
    let len = store.len();

    let result = blocks.consolidate(&BlockRegistry::new());
    assert!(matches!(result, Err(Error::NotImplemented(_))));
    assert_eq!(store.len(), len);
}

/// Merging different block types fails
#[test]
fn test_consolidate_mixed_types_fails() {
    let store = Arc::new(MemoryStore::new("mixed"));
    let blocks = Blocks::new(store);
    blocks.append(&ConcatBlock::new(200, "a", "a")).unwrap();
    blocks.append(&ConcatBlock::new(201, "b", "b")).unwrap();

    let registry = BlockRegistry::new()
        .with(200, ConcatBlock::from_raw)
        .unwrap()
        .with(201, ConcatBlock::from_raw)
        .unwrap();
    let result = blocks.consolidate(&registry);
    assert!(matches!(result, Err(Error::TypeMismatch { .. })));
}
