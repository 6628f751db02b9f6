//! Integration tests for the embedded vector store
//!
//! Run with: cargo test --test store_tests

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use mnemon::error::MnemonError;
use mnemon::store::{MemoryStore, CATEGORY_SCAN_CAP};
use mnemon::types::{
    Category, CreateRecordInput, DecayConfig, StoreConfig, UpdateRecordInput,
};

use common::{distance_for_score, offset_vector};

const DIM: usize = 4;

fn input(category: Category, abstract_: &str, vector: Vec<f32>) -> CreateRecordInput {
    CreateRecordInput {
        category,
        abstract_: abstract_.to_string(),
        overview: String::new(),
        content: format!("{abstract_} in full detail"),
        vector,
        source_session: "session-1".to_string(),
    }
}

#[test]
fn test_store_assigns_distinct_ids() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let mut ids = HashSet::new();

    for i in 0..50 {
        let record = store
            .store(input(Category::Events, &format!("event {i}"), vec![0.0; DIM]))
            .unwrap();
        assert_eq!(record.active_count, 0);
        assert!(ids.insert(record.id), "duplicate id issued");
    }
}

#[test]
fn test_dimension_mismatch_never_persists() {
    let store = MemoryStore::in_memory(DIM).unwrap();

    let err = store
        .store(input(Category::Events, "short vector", vec![0.0; DIM - 1]))
        .unwrap_err();
    assert!(matches!(
        err,
        MnemonError::DimensionMismatch {
            expected: 4,
            actual: 3
        }
    ));

    assert!(store.get_all(10).unwrap().is_empty());
}

#[test]
fn test_dimension_pinned_across_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("memories.db").to_string_lossy().to_string();

    let store = MemoryStore::open(StoreConfig {
        db_path: db_path.clone(),
        dimensions: DIM,
        decay: None,
    })
    .unwrap();
    drop(store);

    let err = MemoryStore::open(StoreConfig {
        db_path,
        dimensions: DIM * 2,
        decay: None,
    })
    .unwrap_err();
    assert!(matches!(err, MnemonError::DimensionMismatch { .. }));
}

#[test]
fn test_concurrent_increments_all_land() {
    let store = Arc::new(MemoryStore::in_memory(DIM).unwrap());
    let record = store
        .store(input(Category::Knowledge, "hot memory", vec![0.0; DIM]))
        .unwrap();

    let n = 20;
    let handles: Vec<_> = (0..n)
        .map(|_| {
            let store = store.clone();
            let id = record.id.clone();
            std::thread::spawn(move || store.increment_active_count(&id).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let after = store.get_by_id(&record.id).unwrap().unwrap();
    assert_eq!(after.active_count, n);
    assert_eq!(after.id, record.id);
    assert!(after.updated_at >= record.updated_at);
}

#[test]
fn test_update_preserves_write_once_fields() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let record = store
        .store(input(Category::Knowledge, "original", vec![0.0; DIM]))
        .unwrap();

    store
        .update(
            &record.id,
            UpdateRecordInput {
                abstract_: Some("revised".to_string()),
                overview: Some("now with an overview".to_string()),
                content: Some("revised content".to_string()),
                vector: Some(vec![1.0; DIM]),
            },
        )
        .unwrap();

    let after = store.get_by_id(&record.id).unwrap().unwrap();
    assert_eq!(after.abstract_, "revised");
    assert_eq!(after.overview, "now with an overview");
    assert_eq!(after.content, "revised content");
    assert_eq!(after.vector, vec![1.0; DIM]);
    // Write-once fields survive the full legitimate update
    assert_eq!(after.id, record.id);
    assert_eq!(after.created_at, record.created_at);
    assert_eq!(after.source_session, record.source_session);
    assert!(after.updated_at >= record.updated_at);
}

#[test]
fn test_update_missing_id_is_noop() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let ghost = mnemon::types::new_memory_id();
    store
        .update(
            &ghost,
            UpdateRecordInput {
                content: Some("nobody home".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(store.get_by_id(&ghost).unwrap().is_none());
}

#[test]
fn test_malformed_ids_rejected_before_storage() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let injection = "mem-x' OR '1'='1";

    assert!(matches!(
        store.get_by_id(injection).unwrap_err(),
        MnemonError::InvalidId(_)
    ));
    assert!(matches!(
        store.increment_active_count(injection).unwrap_err(),
        MnemonError::InvalidId(_)
    ));
    assert!(matches!(
        store
            .update(injection, UpdateRecordInput::default())
            .unwrap_err(),
        MnemonError::InvalidId(_)
    ));
}

#[test]
fn test_search_orders_and_filters() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let query = vec![1.0, 0.0, 0.0, 0.0];

    // Similarities 0.9, 0.5, 0.2 against the query
    let high = store
        .store(input(
            Category::Events,
            "very close",
            offset_vector(&query, distance_for_score(0.9)),
        ))
        .unwrap();
    let mid = store
        .store(input(
            Category::Events,
            "somewhat close",
            offset_vector(&query, distance_for_score(0.5)),
        ))
        .unwrap();
    store
        .store(input(
            Category::Events,
            "far away",
            offset_vector(&query, distance_for_score(0.2)),
        ))
        .unwrap();

    let hits = store.search(&query, 5, 0.3, None).unwrap();
    assert_eq!(hits.len(), 2, "min_score should drop the 0.2 record");
    assert_eq!(hits[0].record.id, high.id);
    assert_eq!(hits[1].record.id, mid.id);
    assert!(hits[0].score > hits[1].score);
    assert!((hits[0].score - 0.9).abs() < 0.01);
}

#[test]
fn test_search_category_filter() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let query = vec![1.0, 0.0, 0.0, 0.0];

    store
        .store(input(Category::Events, "an event", query.clone()))
        .unwrap();
    store
        .store(input(Category::Knowledge, "a fact", query.clone()))
        .unwrap();

    let hits = store.search(&query, 10, 0.0, Some(Category::Knowledge)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.category, Category::Knowledge);
}

#[test]
fn test_search_rejects_wrong_dimension_query() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    let err = store.search(&[1.0; DIM + 1], 5, 0.0, None).unwrap_err();
    assert!(matches!(err, MnemonError::DimensionMismatch { .. }));
}

#[test]
fn test_decay_usage_boost_reorders_equal_hits() {
    let store = MemoryStore::open(StoreConfig {
        db_path: ":memory:".to_string(),
        dimensions: DIM,
        decay: Some(DecayConfig {
            half_life_days: 30.0,
            active_weight: 0.2,
        }),
    })
    .unwrap();

    let query = vec![1.0, 0.0, 0.0, 0.0];
    let offset = offset_vector(&query, distance_for_score(0.8));
    let quiet = store
        .store(input(Category::Knowledge, "rarely used", offset.clone()))
        .unwrap();
    let popular = store
        .store(input(Category::Knowledge, "heavily used", offset))
        .unwrap();

    for _ in 0..10 {
        store.increment_active_count(&popular.id).unwrap();
    }

    let hits = store.search(&query, 2, 0.0, None).unwrap();
    assert_eq!(hits[0].record.id, popular.id, "usage boost should rank first");
    assert_eq!(hits[1].record.id, quiet.id);
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn test_find_by_category_order_and_cap() {
    let store = MemoryStore::in_memory(DIM).unwrap();

    for i in 0..(CATEGORY_SCAN_CAP as usize + 5) {
        store
            .store(input(Category::Events, &format!("event {i}"), vec![0.0; DIM]))
            .unwrap();
    }
    store
        .store(input(Category::Profile, "the profile", vec![0.0; DIM]))
        .unwrap();

    let events = store.find_by_category(Category::Events).unwrap();
    assert_eq!(events.len(), CATEGORY_SCAN_CAP as usize);
    assert!(events
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at));

    let profiles = store.find_by_category(Category::Profile).unwrap();
    assert_eq!(profiles.len(), 1);
}

#[test]
fn test_get_all_caps_results() {
    let store = MemoryStore::in_memory(DIM).unwrap();
    for i in 0..10 {
        store
            .store(input(Category::Events, &format!("event {i}"), vec![0.0; DIM]))
            .unwrap();
    }
    assert_eq!(store.get_all(3).unwrap().len(), 3);
    assert_eq!(store.get_all(100).unwrap().len(), 10);
}
