//! Tests for PageStore
//!
//! These tests verify:
//! - Creating and reopening a store
//! - Page allocation, release and free-list reuse
//! - Double frees, out-of-range pages and free-list cycles
//! - Truncated or foreign files are rejected on open

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;

use starpack::storage::{Page, PageStore, PageType, SectionRoot, HEADER_PAGE, NO_PAGE};
use starpack::{Compression, Config, ErrorKind, PackError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.db");
    (temp_dir, path)
}

fn small_config() -> Config {
    Config::builder().page_size(512).build()
}

// =============================================================================
// Create/Open Tests
// =============================================================================

#[test]
fn test_create_writes_header_page() {
    let (_temp, path) = setup();
    let store = PageStore::create(&path, &small_config()).unwrap();

    assert_eq!(store.page_size(), 512);
    assert_eq!(store.page_count(), 1);
    assert_eq!(store.payload_capacity(), 512 - 32);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 512);
    assert_eq!(store.page_type(HEADER_PAGE).unwrap(), PageType::Metadata);
}

#[test]
fn test_create_rejects_bad_page_size() {
    let (_temp, path) = setup();
    for size in [256, 1000, 128 * 1024] {
        let config = Config::builder().page_size(size).build();
        let err = PageStore::create(&path, &config).err().unwrap();
        assert!(matches!(err, PackError::UnsupportedPageSize(s) if s == size));
    }
}

#[test]
fn test_reopen_preserves_pages_and_sections() {
    let (_temp, path) = setup();
    let config = small_config();
    {
        let mut store = PageStore::create(&path, &config).unwrap();
        let page = store.allocate_page().unwrap();
        store.store_page(page, &Page::new(PageType::Leaf, b"hello".to_vec())).unwrap();
        store.set_section("player", SectionRoot { root: page, record_count: 1 });
        store.sync().unwrap();
    }

    // Page size comes from the file, not the config
    let store = PageStore::open(&path, &Config::default()).unwrap();
    assert_eq!(store.page_size(), 512);
    assert_eq!(store.page_count(), 2);
    assert_eq!(store.section("player"), Some(SectionRoot { root: 1, record_count: 1 }));
    assert_eq!(store.load_page(1).unwrap().payload, b"hello".to_vec());
}

#[test]
fn test_open_missing_file() {
    let (_temp, path) = setup();
    let err = PageStore::open(&path, &Config::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn test_open_foreign_file() {
    let (_temp, path) = setup();
    std::fs::write(&path, vec![0xabu8; 4096]).unwrap();
    let err = PageStore::open(&path, &Config::default()).err().unwrap();
    assert!(matches!(err, PackError::InvalidHeader(_)));
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_open_tiny_file() {
    let (_temp, path) = setup();
    std::fs::write(&path, b"SBPAGE").unwrap();
    let err = PageStore::open(&path, &Config::default()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn test_open_truncated_file() {
    let (_temp, path) = setup();
    {
        let mut store = PageStore::create(&path, &small_config()).unwrap();
        for _ in 0..3 {
            store.allocate_page().unwrap();
        }
        store.sync().unwrap();
    }
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(512 * 2).unwrap();

    let err = PageStore::open(&path, &Config::default()).err().unwrap();
    assert!(matches!(err, PackError::TruncatedFile { expected: 2048, actual: 1024 }));
    assert_eq!(err.kind(), ErrorKind::Structural);
}

// =============================================================================
// Allocation Tests
// =============================================================================

#[test]
fn test_allocate_extends_file() {
    let (_temp, path) = setup();
    let mut store = PageStore::create(&path, &small_config()).unwrap();

    assert_eq!(store.allocate_page().unwrap(), 1);
    assert_eq!(store.allocate_page().unwrap(), 2);
    assert_eq!(store.page_count(), 3);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 3 * 512);
    assert_eq!(store.page_type(2).unwrap(), PageType::Free);
}

#[test]
fn test_free_list_reuse_is_lifo() {
    let (_temp, path) = setup();
    let mut store = PageStore::create(&path, &small_config()).unwrap();
    let pages: Vec<u64> = (0..4).map(|_| store.allocate_page().unwrap()).collect();
    for &page in &pages {
        store.store_page(page, &Page::new(PageType::Overflow, vec![1, 2, 3])).unwrap();
    }

    store.free_page(pages[1]).unwrap();
    store.free_page(pages[3]).unwrap();
    assert_eq!(store.free_pages().unwrap(), vec![pages[3], pages[1]]);

    assert_eq!(store.allocate_page().unwrap(), pages[3]);
    assert_eq!(store.allocate_page().unwrap(), pages[1]);
    assert_eq!(store.free_pages().unwrap(), Vec::<u64>::new());
    assert_eq!(store.header().free_head, NO_PAGE);
    assert_eq!(store.page_count(), 5);
}

#[test]
fn test_free_list_survives_reopen() {
    let (_temp, path) = setup();
    {
        let mut store = PageStore::create(&path, &small_config()).unwrap();
        let a = store.allocate_page().unwrap();
        let b = store.allocate_page().unwrap();
        store.store_page(a, &Page::new(PageType::Overflow, Vec::new())).unwrap();
        store.store_page(b, &Page::new(PageType::Overflow, Vec::new())).unwrap();
        store.free_page(a).unwrap();
        store.sync().unwrap();
    }
    let mut store = PageStore::open(&path, &small_config()).unwrap();
    assert_eq!(store.free_pages().unwrap(), vec![1]);
    assert_eq!(store.allocate_page().unwrap(), 1);
}

#[test]
fn test_double_free_rejected() {
    let (_temp, path) = setup();
    let mut store = PageStore::create(&path, &small_config()).unwrap();
    let page = store.allocate_page().unwrap();
    store.store_page(page, &Page::new(PageType::Leaf, Vec::new())).unwrap();
    store.free_page(page).unwrap();

    let err = store.free_page(page).unwrap_err();
    assert!(matches!(err, PackError::CorruptFreeList { .. }));
}

#[test]
fn test_header_page_cannot_be_freed_or_loaded() {
    let (_temp, path) = setup();
    let mut store = PageStore::create(&path, &small_config()).unwrap();
    assert!(matches!(
        store.free_page(HEADER_PAGE).unwrap_err(),
        PackError::PageOutOfRange { page: 0, .. }
    ));
    assert!(matches!(
        store.load_page(HEADER_PAGE).unwrap_err(),
        PackError::PageOutOfRange { .. }
    ));
}

#[test]
fn test_out_of_range_page() {
    let (_temp, path) = setup();
    let store = PageStore::create(&path, &small_config()).unwrap();
    let err = store.load_page(5).unwrap_err();
    assert!(matches!(err, PackError::PageOutOfRange { page: 5, page_count: 1 }));
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn test_free_list_cycle_detected() {
    let (_temp, path) = setup();
    {
        let mut store = PageStore::create(&path, &small_config()).unwrap();
        for _ in 0..2 {
            let page = store.allocate_page().unwrap();
            store.store_page(page, &Page::new(PageType::Leaf, Vec::new())).unwrap();
        }
        store.free_page(1).unwrap();
        store.free_page(2).unwrap();
        store.sync().unwrap();
    }

    // Point page 1 (tail of the list) back at page 2 (head)
    let mut looped = Page::new(PageType::Free, Vec::new());
    looped.header.link_a = 2;
    let raw = looped.encode(1, 512, Compression::None).unwrap();
    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(512)).unwrap();
    file.write_all(&raw).unwrap();
    drop(file);

    let store = PageStore::open(&path, &small_config()).unwrap();
    assert!(matches!(
        store.free_pages().unwrap_err(),
        PackError::CycleDetected { page: 2 }
    ));
}

#[test]
fn test_failed_allocation_keeps_page_count() {
    let (_temp, path) = setup();
    PageStore::create(&path, &small_config()).unwrap();

    let mut store = PageStore::open_read_only(&path, &small_config()).unwrap();
    assert_eq!(store.allocate_page().unwrap_err().kind(), ErrorKind::Io);
    assert_eq!(store.page_count(), 1);
    assert!(!store.is_dirty());
}

#[test]
fn test_reclaim_on_error() {
    let (_temp, path) = setup();
    let mut store = PageStore::create(&path, &small_config()).unwrap();
    let kept = store.allocate_page().unwrap();
    let a = store.allocate_page().unwrap();
    let b = store.allocate_page().unwrap();

    let ok: starpack::Result<u8> = Ok(7);
    assert_eq!(store.reclaim_on_error(&[kept], ok).unwrap(), 7);
    assert_eq!(store.header().free_head, NO_PAGE);

    let failed: starpack::Result<()> = Err(PackError::KeyNotFound);
    assert!(matches!(
        store.reclaim_on_error(&[a, b], failed).unwrap_err(),
        PackError::KeyNotFound
    ));
    assert_eq!(store.free_pages().unwrap(), vec![a, b]);
    assert_eq!(store.allocate_page().unwrap(), a);
}

// =============================================================================
// Stats Tests
// =============================================================================

#[test]
fn test_stats_count_page_types() {
    let (_temp, path) = setup();
    let mut store = PageStore::create(&path, &small_config()).unwrap();
    let leaf = store.allocate_page().unwrap();
    let index = store.allocate_page().unwrap();
    let overflow = store.allocate_page().unwrap();
    store.allocate_page().unwrap();
    store.store_page(leaf, &Page::new(PageType::Leaf, Vec::new())).unwrap();
    let mut index_page = Page::new(PageType::Index, Vec::new());
    index_page.header.link_a = leaf;
    store.store_page(index, &index_page).unwrap();
    store.store_page(overflow, &Page::new(PageType::Overflow, Vec::new())).unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.page_count, 5);
    assert_eq!(stats.metadata, 1);
    assert_eq!(stats.leaf, 1);
    assert_eq!(stats.index, 1);
    assert_eq!(stats.overflow, 1);
    assert_eq!(stats.free, 1);
}
