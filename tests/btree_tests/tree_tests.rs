//! Tests for BTree lookup, insert, delete and iteration
//!
//! These tests verify:
//! - Inserts in random order come back sorted
//! - Splits grow the tree; deletes shrink it back to a single leaf
//! - Overwrites, missing keys and oversized keys
//! - Large records move to overflow chains and are freed with their entry
//! - Every page is accounted for after deletes and release

use starpack::btree::{BTree, Node};
use starpack::storage::{PageStore, PageType};
use starpack::{Compression, Config, ErrorKind, PackError};

use crate::{key, noise, record, setup_store, shuffled, small_config};

fn collect(tree: &BTree, store: &PageStore) -> Vec<(Vec<u8>, Vec<u8>)> {
    tree.iter(store).collect::<Result<Vec<_>, _>>().unwrap()
}

// =============================================================================
// Insert and Lookup
// =============================================================================

#[test]
fn test_empty_tree() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let tree = BTree::create(&mut store, &config).unwrap();

    assert_eq!(store.page_type(tree.root()).unwrap(), PageType::Leaf);
    assert!(collect(&tree, &store).is_empty());
    assert!(matches!(tree.lookup(&store, b"anything").unwrap_err(), PackError::KeyNotFound));
}

#[test]
fn test_insert_random_order_iterates_sorted() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    let n = 1500;
    for i in shuffled(n, 7) {
        assert!(tree.insert(&mut store, &key(i), &record(i)).unwrap());
    }

    let all = collect(&tree, &store);
    assert_eq!(all.len(), n);
    for (i, (k, v)) in all.iter().enumerate() {
        assert_eq!(k, &key(i));
        assert_eq!(v, &record(i));
    }
    for i in (0..n).step_by(37) {
        assert_eq!(tree.lookup(&store, &key(i)).unwrap(), record(i));
    }
    assert_eq!(store.page_type(tree.root()).unwrap(), PageType::Index);
}

#[test]
fn test_tree_grows_beyond_two_levels() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    for i in 0..3000 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }

    let mut height = 1;
    let mut page = tree.root();
    while let Node::Index(index) = Node::load(&store, page).unwrap() {
        page = index.first_child;
        height += 1;
    }
    assert!(height >= 3, "height {height}");
}

#[test]
fn test_overwrite_returns_false() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    assert!(tree.insert(&mut store, b"hp", b"10").unwrap());
    assert!(!tree.insert(&mut store, b"hp", b"42").unwrap());
    assert_eq!(tree.lookup(&store, b"hp").unwrap(), b"42".to_vec());
    assert_eq!(collect(&tree, &store).len(), 1);
}

#[test]
fn test_lookup_missing_key() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    for i in 0..200 {
        tree.insert(&mut store, &key(i * 2), &record(i)).unwrap();
    }

    let err = tree.lookup(&store, &key(7)).unwrap_err();
    assert!(matches!(err, PackError::KeyNotFound));
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(tree.lookup(&store, b"").is_err());
    assert!(tree.lookup(&store, b"zzz").is_err());
}

#[test]
fn test_empty_key_and_empty_record() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    tree.insert(&mut store, b"", b"root").unwrap();
    tree.insert(&mut store, b"a", b"").unwrap();
    assert_eq!(tree.lookup(&store, b"").unwrap(), b"root".to_vec());
    assert_eq!(tree.lookup(&store, b"a").unwrap(), Vec::<u8>::new());
}

#[test]
fn test_key_too_large() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    // 512-byte pages: 480-byte payload, keys up to 60 bytes
    assert!(tree.insert(&mut store, &[b'k'; 60], b"ok").is_ok());
    let err = tree.insert(&mut store, &[b'k'; 61], b"no").unwrap_err();
    assert!(matches!(err, PackError::KeyTooLarge { len: 61, max: 60 }));
    assert_eq!(err.kind(), ErrorKind::Usage);
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn test_delete_returns_record() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    tree.insert(&mut store, b"a", b"1").unwrap();
    tree.insert(&mut store, b"b", b"2").unwrap();

    assert_eq!(tree.delete(&mut store, b"a").unwrap(), b"1".to_vec());
    assert!(matches!(tree.lookup(&store, b"a").unwrap_err(), PackError::KeyNotFound));
    assert!(matches!(tree.delete(&mut store, b"a").unwrap_err(), PackError::KeyNotFound));
    assert_eq!(tree.lookup(&store, b"b").unwrap(), b"2".to_vec());
}

#[test]
fn test_delete_everything_collapses_tree() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    let n = 1200;
    for i in shuffled(n, 11) {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }
    for (done, i) in shuffled(n, 23).into_iter().enumerate() {
        assert_eq!(tree.delete(&mut store, &key(i)).unwrap(), record(i));
        if done % 200 == 0 {
            assert_eq!(collect(&tree, &store).len(), n - done - 1);
        }
    }

    assert!(collect(&tree, &store).is_empty());
    assert_eq!(store.page_type(tree.root()).unwrap(), PageType::Leaf);

    // Only the header and the root leaf stay in use
    let stats = store.stats().unwrap();
    assert_eq!(stats.leaf, 1);
    assert_eq!(stats.index, 0);
    assert_eq!(stats.free, store.page_count() - 2);
}

#[test]
fn test_interleaved_inserts_and_deletes() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    let mut expected = std::collections::BTreeMap::new();

    for (step, i) in shuffled(2000, 5).into_iter().enumerate() {
        let k = key(i % 600);
        if step % 3 == 2 && expected.contains_key(&k) {
            let old = tree.delete(&mut store, &k).unwrap();
            assert_eq!(Some(old), expected.remove(&k));
        } else {
            let added = tree.insert(&mut store, &k, &record(step)).unwrap();
            assert_eq!(added, expected.insert(k, record(step)).is_none());
        }
    }

    let all = collect(&tree, &store);
    let want: Vec<(Vec<u8>, Vec<u8>)> = expected.into_iter().collect();
    assert_eq!(all, want);
}

#[test]
fn test_freed_pages_are_reused() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    for i in 0..500 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }
    for i in 0..500 {
        tree.delete(&mut store, &key(i)).unwrap();
    }
    let pages_before = store.page_count();
    for i in 0..500 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }
    assert_eq!(store.page_count(), pages_before);
}

// =============================================================================
// Large Records
// =============================================================================

#[test]
fn test_large_record_uses_overflow_chain() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    let big = noise(5000, 99);
    tree.insert(&mut store, b"world", &big).unwrap();
    tree.insert(&mut store, b"alpha", b"small").unwrap();

    assert_eq!(tree.lookup(&store, b"world").unwrap(), big);
    assert!(store.stats().unwrap().overflow >= 5000 / 480);

    let all = collect(&tree, &store);
    assert_eq!(all[1], (b"world".to_vec(), big.clone()));

    assert_eq!(tree.delete(&mut store, b"world").unwrap(), big);
    assert_eq!(store.stats().unwrap().overflow, 0);
}

#[test]
fn test_overwriting_large_record_frees_old_chain() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    tree.insert(&mut store, b"k", &noise(3000, 3)).unwrap();
    let overflow_before = store.stats().unwrap().overflow;
    tree.insert(&mut store, b"k", &noise(3000, 4)).unwrap();
    assert_eq!(store.stats().unwrap().overflow, overflow_before);
    assert_eq!(tree.lookup(&store, b"k").unwrap(), noise(3000, 4));

    tree.insert(&mut store, b"k", b"tiny").unwrap();
    assert_eq!(store.stats().unwrap().overflow, 0);
}

#[test]
fn test_compressible_record_round_trips_with_zstd() {
    let config = Config::builder()
        .page_size(512)
        .compression(Compression::Zstd { level: 3 })
        .build();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();

    let repetitive: Vec<u8> = b"0123456789".iter().cycle().take(20_000).copied().collect();
    tree.insert(&mut store, b"bulk", &repetitive).unwrap();
    for i in 0..300 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }

    assert_eq!(tree.lookup(&store, b"bulk").unwrap(), repetitive);
    // 20 KB of repetition needs far fewer than 42 overflow pages once compressed
    assert!(store.stats().unwrap().overflow < 5);
    assert_eq!(collect(&tree, &store).len(), 301);
}

// =============================================================================
// Persistence and Release
// =============================================================================

#[test]
fn test_tree_survives_reopen() {
    let config = small_config();
    let (_temp, path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    for i in 0..400 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }
    let root = tree.root();
    store.sync().unwrap();
    drop(store);

    let store = PageStore::open(&path, &config).unwrap();
    let tree = BTree::open(root, &config);
    assert_eq!(tree.lookup(&store, &key(123)).unwrap(), record(123));
    assert_eq!(collect(&tree, &store).len(), 400);
}

#[test]
fn test_iterator_is_restartable() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    for i in 0..100 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }

    let first: Vec<_> = tree.iter(&store).take(10).collect::<Result<_, _>>().unwrap();
    let again: Vec<_> = tree.iter(&store).take(10).collect::<Result<_, _>>().unwrap();
    assert_eq!(first, again);
    assert_eq!(first[0].0, key(0));
}

#[test]
fn test_release_frees_every_page() {
    let config = small_config();
    let (_temp, _path, mut store) = setup_store(&config);
    let mut tree = BTree::create(&mut store, &config).unwrap();
    for i in 0..400 {
        tree.insert(&mut store, &key(i), &record(i)).unwrap();
    }
    tree.insert(&mut store, b"big", &noise(2000, 8)).unwrap();

    tree.release(&mut store).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.free, store.page_count() - 1);
    assert_eq!(store.free_pages().unwrap().len() as u64, stats.free);
}
