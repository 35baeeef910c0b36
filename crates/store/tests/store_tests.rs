//! Integration tests for the content store: eviction, persistence, recovery

use edgenode_store::{
    ContentStore, Error, INDEX_FILE, OBJECTS_DIR, PutOptions, RecoverySource, StoreConfig,
    file_name_for_key,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

async fn open_at(dir: &TempDir, capacity: u64) -> ContentStore {
    ContentStore::open(StoreConfig::new(dir.path(), capacity))
        .await
        .expect("open store")
}

fn payload(byte: u8, len: usize) -> Vec<u8> {
    vec![byte; len]
}

fn object_files(dir: &TempDir) -> BTreeSet<String> {
    std::fs::read_dir(dir.path().join(OBJECTS_DIR))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

// ==========================================================================
// Eviction
// ==========================================================================

#[tokio::test]
async fn full_store_evicts_oldest_among_equal_counts() {
    // capacity 1000, entries capped at 100 bytes: ten entries fill it
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for i in 0..10u8 {
        store
            .put(&format!("e{i}"), &payload(i, 100), "application/octet-stream")
            .await
            .unwrap();
    }
    assert_eq!(store.stats().current_size, 1000);

    store
        .put("e10", &payload(10, 100), "application/octet-stream")
        .await
        .unwrap();

    let stats = store.stats();
    assert_eq!(stats.current_size, 1000);
    assert_eq!(stats.entry_count, 10);
    assert!(store.get("e0").is_none(), "oldest entry is evicted first");
    assert!(store.get("e1").is_some());
    assert!(store.get("e10").is_some());
}

#[tokio::test]
async fn least_accessed_entry_is_evicted() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for key in ["a", "b", "c"] {
        store.put(key, &payload(1, 100), "text/plain").await.unwrap();
    }
    for i in 0..7 {
        let key = format!("filler{i}");
        store.put(&key, &payload(2, 100), "text/plain").await.unwrap();
        for _ in 0..5 {
            store.get(&key);
        }
    }
    store.get("a");
    store.get("a");
    store.get("b");

    store.put("d", &payload(3, 100), "text/plain").await.unwrap();

    assert!(store.get("c").is_none(), "never-read entry goes first");
    assert!(store.get("a").is_some());
    assert!(store.get("b").is_some());
    assert!(store.get("d").is_some());
}

#[tokio::test]
async fn eviction_frees_only_what_is_needed() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for i in 0..20u8 {
        store
            .put(&format!("s{i}"), &payload(i, 50), "text/plain")
            .await
            .unwrap();
    }
    store.put("big", &payload(9, 100), "text/plain").await.unwrap();

    let stats = store.stats();
    assert_eq!(stats.current_size, 1000);
    assert_eq!(stats.entry_count, 19);
    assert!(store.get("s0").is_none());
    assert!(store.get("s1").is_none());
    assert!(store.get("s2").is_some());
}

#[tokio::test]
async fn replacing_a_key_does_not_evict_it() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for i in 0..10u8 {
        store
            .put(&format!("e{i}"), &payload(i, 100), "text/plain")
            .await
            .unwrap();
    }
    store.put("e9", &payload(42, 100), "text/plain").await.unwrap();

    assert_eq!(store.stats().entry_count, 10);
    let (_, bytes) = store.fetch("e9").await.unwrap().unwrap();
    assert_eq!(bytes[0], 42);
}

#[tokio::test]
async fn evicted_files_are_removed_from_disk() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for i in 0..12u8 {
        store
            .put(&format!("e{i}"), &payload(i, 100), "text/plain")
            .await
            .unwrap();
    }
    let files = object_files(&dir);
    assert_eq!(files.len(), 10);
    assert!(!files.contains("e0"));
    assert!(!files.contains("e1"));
}

#[tokio::test]
async fn concurrent_puts_never_exceed_capacity() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open_at(&dir, 1000).await);

    let mut handles = Vec::new();
    for i in 0..64u8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let key = format!("k{}", i % 24);
            store.put(&key, &payload(i, 90), "text/plain").await.unwrap();
            assert!(store.stats().current_size <= 1000);
            store.fetch(&key).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = store.stats();
    assert!(stats.current_size <= 1000);
    assert_eq!(stats.current_size, stats.entry_count as u64 * 90);
    assert_eq!(object_files(&dir).len(), stats.entry_count);
}

// ==========================================================================
// Delete / purge / invalidate
// ==========================================================================

#[tokio::test]
async fn delete_reports_existence() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("x", b"bytes", "text/plain").await.unwrap();

    assert!(store.delete("x").await);
    assert!(!store.delete("x").await);
    assert!(store.get("x").is_none());
    assert_eq!(store.stats().current_size, 0);
}

#[tokio::test]
async fn deleting_source_keeps_derived_entries() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("img.png", b"source", "image/png").await.unwrap();
    store
        .put_with("img.png~t1", b"derived", "image/webp", PutOptions::derived("img.png"))
        .await
        .unwrap();

    assert!(store.delete("img.png").await);

    let derived = store.get("img.png~t1").unwrap();
    assert!(derived.is_derived);
    assert_eq!(derived.source_key.as_deref(), Some("img.png"));
}

#[tokio::test]
async fn invalidate_matches_whole_key() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    for key in ["img/a.png", "img/b.png", "css/img/a.png", "img/c.jpg"] {
        store.put(key, b"x", "application/octet-stream").await.unwrap();
    }

    let removed = store.invalidate(r"img/.*\.png").unwrap();

    assert_eq!(removed, 2);
    assert!(store.get("css/img/a.png").is_some(), "substring matches are kept");
    assert!(store.get("img/c.jpg").is_some());
    assert!(store.get("img/a.png").is_none());
}

#[tokio::test]
async fn invalidate_rejects_bad_patterns() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    let err = store.invalidate("img/(").unwrap_err();
    assert!(matches!(err, Error::InvalidPattern { .. }));
}

#[tokio::test]
async fn purge_removes_entries_and_index() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("a", b"1", "text/plain").await.unwrap();
    store.put("b", b"2", "text/plain").await.unwrap();
    store.save_index().await.unwrap();

    assert_eq!(store.purge().await.unwrap(), 2);
    assert!(!dir.path().join(INDEX_FILE).exists());
    assert!(object_files(&dir).is_empty());
    assert_eq!(store.stats().current_size, 0);
    drop(store);

    let reopened = open_at(&dir, 10_000).await;
    assert_eq!(reopened.stats().entry_count, 0);
    assert_eq!(reopened.stats().current_size, 0);
}

// ==========================================================================
// Persistence and recovery
// ==========================================================================

#[tokio::test]
async fn reload_yields_identical_entries() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("a.png", b"png-bytes", "image/png").await.unwrap();
    store.put("b.css", b"body{}", "text/css").await.unwrap();
    store
        .put_with("a.png~t9", b"webp", "image/webp", PutOptions::derived("a.png"))
        .await
        .unwrap();
    store.save_index().await.unwrap();

    let live = |s: &ContentStore| {
        ["a.png", "b.css", "a.png~t9"]
            .iter()
            .filter_map(|k| s.get(k))
            .map(|e| (e.key, e.size, e.content_type, e.is_derived))
            .collect::<Vec<_>>()
    };
    let before = live(&store);
    let stats_before = store.stats();
    drop(store);

    let reopened = open_at(&dir, 10_000).await;
    assert_eq!(reopened.last_recovery().source, RecoverySource::Index);
    assert_eq!(reopened.last_recovery().recovered, 3);
    assert_eq!(reopened.stats(), stats_before);
    assert_eq!(live(&reopened), before);
}

#[tokio::test]
async fn access_counts_survive_restart() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for i in 0..10u8 {
        store
            .put(&format!("e{i}"), &payload(i, 100), "text/plain")
            .await
            .unwrap();
    }
    // e0 is oldest but hot; e1 is the coldest after the restart
    for _ in 0..3 {
        store.get("e0");
    }
    for i in 2..10 {
        store.get(&format!("e{i}"));
    }
    store.save_index().await.unwrap();
    drop(store);

    let reopened = open_at(&dir, 1000).await;
    reopened.put("new", &payload(0, 100), "text/plain").await.unwrap();
    assert!(reopened.get("e1").is_none());
    assert!(reopened.get("e0").is_some());
}

#[tokio::test]
async fn reopening_with_smaller_capacity_evicts_to_fit() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 1000).await;
    for i in 0..10u8 {
        store
            .put(&format!("e{i}"), &payload(i, 100), "text/plain")
            .await
            .unwrap();
    }
    for _ in 0..3 {
        store.get("e0");
    }
    for i in 5..10 {
        store.get(&format!("e{i}"));
    }
    store.close().await.unwrap();
    drop(store);

    let reopened = open_at(&dir, 500).await;
    let stats = reopened.stats();
    assert_eq!(stats.current_size, 500);
    assert_eq!(stats.entry_count, 5);

    let report = reopened.last_recovery();
    assert_eq!(report.evicted, 5);
    assert_eq!(report.recovered, 5);

    // Never-read entries go first, oldest first, then the oldest read once
    for key in ["e1", "e2", "e3", "e4", "e5"] {
        assert!(reopened.get(key).is_none(), "{key} should be evicted");
    }
    for key in ["e0", "e6", "e7", "e8", "e9"] {
        assert!(reopened.get(key).is_some(), "{key} should survive");
    }
    let files = object_files(&dir);
    assert_eq!(files.len(), 5);
    assert!(!files.contains(&file_name_for_key("e1")));
    assert!(files.contains(&file_name_for_key("e0")));
}

#[tokio::test]
async fn recovery_drops_expired_entries() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store
        .put_with(
            "short",
            b"soon gone",
            "text/plain",
            PutOptions::default().with_ttl(Duration::from_millis(50)),
        )
        .await
        .unwrap();
    store.put("long", b"kept", "text/plain").await.unwrap();
    store.save_index().await.unwrap();
    drop(store);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let reopened = open_at(&dir, 10_000).await;

    assert_eq!(reopened.last_recovery().expired, 1);
    assert!(reopened.get("short").is_none());
    assert!(reopened.get("long").is_some());
    assert!(!object_files(&dir).contains("short"));
    assert_eq!(reopened.stats().current_size, 4);
}

#[tokio::test]
async fn recovery_drops_size_mismatch_and_missing_files() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    let tampered = store.put("tampered", b"12345", "text/plain").await.unwrap();
    let vanished = store.put("vanished", b"abc", "text/plain").await.unwrap();
    store.put("intact", b"ok", "text/plain").await.unwrap();
    store.save_index().await.unwrap();
    drop(store);

    std::fs::write(&tampered.location, b"123").unwrap();
    std::fs::remove_file(&vanished.location).unwrap();

    let reopened = open_at(&dir, 10_000).await;
    let report = reopened.last_recovery();
    assert_eq!(report.corrupt, 1);
    assert_eq!(report.missing, 1);
    assert_eq!(report.recovered, 1);
    assert!(!tampered.location.exists(), "corrupt bytes are deleted");
    assert_eq!(reopened.stats().current_size, 2);
}

#[tokio::test]
async fn recovery_removes_unreferenced_files() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("kept", b"1", "text/plain").await.unwrap();
    store.save_index().await.unwrap();
    drop(store);

    std::fs::write(dir.path().join(OBJECTS_DIR).join("stray"), b"junk").unwrap();
    std::fs::write(dir.path().join(OBJECTS_DIR).join(".partial.tmp"), b"half").unwrap();

    let reopened = open_at(&dir, 10_000).await;
    assert_eq!(reopened.last_recovery().strays_removed, 2);
    assert_eq!(object_files(&dir), BTreeSet::from(["kept".to_string()]));
}

#[tokio::test]
async fn missing_index_accounts_orphaned_bytes() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("a", &payload(1, 300), "text/plain").await.unwrap();
    store.put("b", &payload(2, 200), "text/plain").await.unwrap();
    // dropped without saving the index
    drop(store);

    let reopened = open_at(&dir, 10_000).await;
    let report = reopened.last_recovery();
    assert_eq!(report.source, RecoverySource::DirectoryScan);
    assert_eq!(report.orphan_bytes, 500);
    assert_eq!(reopened.stats().entry_count, 0);
    assert_eq!(reopened.stats().current_size, 500);
    assert!(reopened.get("a").is_none());

    // Landing the same key reclaims the orphan
    reopened.put("a", &payload(3, 100), "text/plain").await.unwrap();
    assert_eq!(reopened.stats().current_size, 300);
    assert_eq!(reopened.orphan_bytes(), 200);
}

#[tokio::test]
async fn unparseable_index_falls_back_to_scan() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store.put("a", b"abc", "text/plain").await.unwrap();
    store.save_index().await.unwrap();
    drop(store);

    std::fs::write(dir.path().join(INDEX_FILE), b"{ not json").unwrap();

    let reopened = open_at(&dir, 10_000).await;
    assert_eq!(reopened.last_recovery().source, RecoverySource::DirectoryScan);
    assert_eq!(reopened.stats().current_size, 3);
}

#[tokio::test]
async fn sweep_removes_expired_entries() {
    let dir = TempDir::new().unwrap();
    let store = open_at(&dir, 10_000).await;
    store
        .put_with(
            "t",
            b"x",
            "text/plain",
            PutOptions::default().with_ttl(Duration::from_millis(10)),
        )
        .await
        .unwrap();
    store.put("keep", b"y", "text/plain").await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let report = store.sweep_expired();
    assert_eq!(report.expired, 1);
    assert_eq!(store.stats().entry_count, 1);
    assert_eq!(object_files(&dir), BTreeSet::from(["keep".to_string()]));
}

// ==========================================================================
// Properties
// ==========================================================================

#[derive(Debug, Clone)]
enum Op {
    Put(u8, usize),
    Delete(u8),
    Get(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..16, 1usize..=100).prop_map(|(k, len)| Op::Put(k, len)),
        (0u8..16).prop_map(Op::Delete),
        (0u8..16).prop_map(Op::Get),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn capacity_is_never_exceeded(ops in proptest::collection::vec(op(), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let dir = TempDir::new().unwrap();
            let store = open_at(&dir, 500).await;
            for op in ops {
                match op {
                    Op::Put(k, len) => {
                        let _ = store.put(&format!("k{k}"), &payload(k, len), "text/plain").await;
                    }
                    Op::Delete(k) => {
                        store.delete(&format!("k{k}")).await;
                    }
                    Op::Get(k) => {
                        store.get(&format!("k{k}"));
                    }
                }
                let stats = store.stats();
                assert!(stats.current_size <= stats.capacity);
            }
        });
    }
}
