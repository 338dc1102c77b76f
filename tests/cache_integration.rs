//! Integration tests for the table loading path.
//!
//! These tests drive the full chain a request goes through:
//! 1. Table source lookup by key
//! 2. Read-through cache
//! 3. Decode and version gate
//! 4. Resolution

use std::collections::BTreeSet;
use std::sync::Arc;

use spawn_resolver::{
    codec, load_table, resolve, CacheConfig, CachedTableSource, InMemoryTableSource, LoadError,
    OverlapTableBuilder, PostCandidate, SegmentId, TableError, TableKey, TableSource,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn key_for(post_chunk: &str) -> TableKey {
    TableKey::new("zfish", "chunks/x0_y0_z0/", format!("chunks/{post_chunk}/"))
}

fn table_bytes(post_id: u32, overlap: u64) -> Vec<u8> {
    let table = OverlapTableBuilder::new()
        .candidate(
            1u32,
            PostCandidate::new(SegmentId::new(post_id), overlap, true)
                .with_support(SegmentId::new(1), overlap),
        )
        .build();
    codec::encode(&table)
}

fn selection() -> BTreeSet<SegmentId> {
    [SegmentId::new(1)].into_iter().collect()
}

fn cached_origin(tables: &[(TableKey, Vec<u8>)]) -> CachedTableSource<InMemoryTableSource> {
    let mut origin = InMemoryTableSource::new();
    for (key, bytes) in tables {
        origin.insert(key.clone(), bytes.clone());
    }
    CachedTableSource::new(origin)
}

// ─────────────────────────────────────────────────────────────────────────────
// LOADING THROUGH THE CACHE
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cached_table_resolves_like_origin() {
    let key = key_for("x1_y0_z0");
    let source = cached_origin(&[(key.clone(), table_bytes(100, 1000))]);

    let first = load_table(&source, &key).await.unwrap();
    let second = load_table(&source, &key).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.fingerprint(), second.fingerprint());
    assert_eq!(
        resolve(&second, &selection(), 0.6),
        resolve(&first, &selection(), 0.6)
    );
    assert_eq!(source.origin().fetch_count(), 1);

    let stats = source.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses), (1, 1));
}

#[tokio::test]
async fn test_keys_do_not_share_entries() {
    let a = key_for("x1_y0_z0");
    let b = key_for("x0_y1_z0");
    let source = cached_origin(&[(a.clone(), table_bytes(100, 10)), (b.clone(), table_bytes(200, 20))]);

    let table_a = load_table(&source, &a).await.unwrap();
    let table_b = load_table(&source, &b).await.unwrap();

    assert_eq!(resolve(&table_a, &selection(), 0.6)[0][&SegmentId::new(100)], 10);
    assert_eq!(resolve(&table_b, &selection(), 0.6)[0][&SegmentId::new(200)], 20);
    assert_eq!(source.cache_stats().unwrap().len, 2);
}

#[tokio::test]
async fn test_missing_table_is_fetch_error() {
    let source = cached_origin(&[]);
    let key = key_for("x1_y0_z0");

    let err = load_table(&source, &key).await.unwrap_err();

    match err {
        LoadError::Fetch { key: name, .. } => {
            assert_eq!(name, "zfish/chunks/x0_y0_z0/x1_y0_z0.pb.spawn")
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_bytes_fail_decode_on_every_load() {
    let key = key_for("x1_y0_z0");
    let source = cached_origin(&[(key.clone(), b"\x08\x01garbage".to_vec())]);

    for _ in 0..2 {
        let err = load_table(&source, &key).await.unwrap_err();
        assert!(matches!(err, LoadError::Table(TableError::Decode { .. })));
    }
    // The cache holds raw bytes; decoding is never cached.
    assert_eq!(source.origin().fetch_count(), 1);
}

#[tokio::test]
async fn test_version_mismatch_surfaces_found_and_expected() {
    let key = key_for("x1_y0_z0");
    let table = OverlapTableBuilder::new().version(2).build();
    let source = cached_origin(&[(key.clone(), codec::encode(&table))]);

    let err = load_table(&source, &key).await.unwrap_err();

    assert!(matches!(
        err,
        LoadError::Table(TableError::UnsupportedVersion {
            found: 2,
            expected: 1
        })
    ));
}

#[tokio::test]
async fn test_uncompressed_cache_serves_same_bytes() {
    let key = key_for("x1_y0_z0");
    let bytes = table_bytes(100, 1000);
    let mut origin = InMemoryTableSource::new();
    origin.insert(key.clone(), bytes.clone());
    let config = CacheConfig {
        compress: false,
        ..CacheConfig::default()
    };
    let source = CachedTableSource::with_config(origin, config);

    assert_eq!(source.fetch(&key).await.unwrap(), bytes);
    assert_eq!(source.fetch(&key).await.unwrap(), bytes);
    assert_eq!(source.origin().fetch_count(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// CONCURRENCY
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_all_succeed() {
    let key = key_for("x1_y0_z0");
    let source = Arc::new(cached_origin(&[(key.clone(), table_bytes(100, 1000))]));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let source = Arc::clone(&source);
            let key = key.clone();
            tokio::spawn(async move { load_table(source.as_ref(), &key).await.map(|t| t.fingerprint()) })
        })
        .collect();

    let mut fingerprints = BTreeSet::new();
    for handle in handles {
        fingerprints.insert(handle.await.unwrap().unwrap());
    }

    // Losing a cache race only costs extra origin fetches.
    assert_eq!(fingerprints.len(), 1);
    let fetches = source.origin().fetch_count();
    assert!((1..=16).contains(&fetches));
    assert_eq!(source.cache_stats().unwrap().len, 1);
}
