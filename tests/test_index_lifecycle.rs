//! Tests for the shared approximate index lifecycle: lazy activation at
//! the high-water mark, deletion retraction, persistence across manager
//! restarts, and rank fusion over multiple searches.

use std::sync::Arc;

use serde::Serialize;

use vectordb::embedding::EmbeddingGenerator;
use vectordb::error::EmbeddingResult;
use vectordb::fusion::rrf;
use vectordb::index::INDEX_META_FILE;
use vectordb::store::{MemoryRecordStore, VectorSource, VectorStore};
use vectordb::types::VectorDimension;
use vectordb::Settings;

const DIM: usize = 8;

struct DeterministicEmbedder;

impl EmbeddingGenerator for DeterministicEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut embedding = vec![0.1_f32; DIM];
                for (i, byte) in text.bytes().enumerate() {
                    embedding[i % DIM] += f32::from(byte) / 255.0;
                }
                // Topic bumps keep semantically related fixtures close.
                if text.contains("rust") {
                    embedding[0] += 3.0;
                    embedding[1] += 2.0;
                }
                if text.contains("gardening") {
                    embedding[4] += 3.0;
                    embedding[5] += 2.0;
                }
                let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                embedding.iter().map(|x| x / magnitude).collect()
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        VectorDimension::new(DIM).expect("test dimension is non-zero")
    }
}

/// Small thresholds so tests exercise the approximate path without
/// thousands of records.
fn small_index_settings(persist_dir: &std::path::Path) -> Settings {
    let mut settings = Settings::default();
    settings.embedding.dimension = DIM;
    settings.persist_dir = persist_dir.to_path_buf();
    settings.index.high_water_mark = 5;
    settings.search.bruteforce_ceiling = 4;
    settings
}

fn build_manager(settings: Settings) -> VectorStore {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    VectorStore::new(
        settings,
        Arc::new(MemoryRecordStore::new()),
        Arc::new(DeterministicEmbedder),
    )
    .expect("manager construction succeeds")
}

#[derive(Serialize)]
struct Note {
    id: u64,
    body: String,
}

impl Note {
    fn new(id: u64, body: &str) -> Self {
        Self {
            id,
            body: body.to_string(),
        }
    }
}

impl VectorSource for Note {
    fn collection_kind(&self) -> &str {
        "note"
    }

    fn object_id(&self) -> u64 {
        self.id
    }

    fn get_text(&self) -> String {
        self.body.clone()
    }
}

fn seed_texts(manager: &VectorStore, n: u64) {
    for i in 1..=n {
        manager
            .add_text(i, &format!("document number {i} about topic {}", i % 3), None, None)
            .unwrap();
    }
}

#[test]
fn test_index_activates_past_high_water_mark() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = build_manager(small_index_settings(dir.path()));

    seed_texts(&manager, 5);
    assert!(manager.ann_handle().is_none(), "at the mark, not past it");

    manager.add_text(6, "one past the mark", None, None).unwrap();
    let handle = manager.ann_handle().expect("index activated");
    // The lazily created index was backfilled from the full record set.
    assert_eq!(handle.read().item_count(), 6);
}

#[test]
fn test_approximate_path_returns_ordered_hits() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = build_manager(small_index_settings(dir.path()));

    seed_texts(&manager, 8);
    assert!(manager.ann_handle().is_some());

    let outcome = manager.search_text("document number 3 about topic 0", Some(5)).unwrap();
    assert!(!outcome.hits.is_empty());
    assert_eq!(outcome.hits[0].record.object_id, Some(3));
    for pair in outcome.hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_deleted_record_is_retracted_from_index() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = build_manager(small_index_settings(dir.path()));

    for i in 1..=8 {
        manager
            .add_instance(&Note::new(i, &format!("note body {i}")))
            .unwrap();
    }
    let handle = manager.ann_handle().expect("index active");
    let victim = manager.get_by_ref(Some("note"), 4).unwrap().id;

    manager.on_source_deleted("note", 4).unwrap();
    assert!(handle.read().is_deleted(victim));

    // The tombstoned id is never returned, for any query.
    for i in 1..=8 {
        let outcome = manager
            .search_text(&format!("note body {i}"), Some(8))
            .unwrap();
        assert!(outcome.hits.iter().all(|hit| hit.record.id != victim));
    }
}

#[test]
fn test_persisted_index_restores_across_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = small_index_settings(dir.path());

    {
        let manager = build_manager(settings.clone());
        seed_texts(&manager, 7);
        let persisted_to = manager.persist_index().unwrap().expect("index was active");
        assert!(persisted_to.join(INDEX_META_FILE).exists());
    }

    // A fresh process restores the index from disk before any record is
    // re-added.
    let manager = build_manager(settings);
    let handle = manager.ann_handle().expect("restored from disk");
    let guard = handle.read();
    assert_eq!(guard.item_count(), 7);
    assert_eq!(guard.dimension().get(), DIM);
}

#[test]
fn test_corrupt_persisted_index_falls_back_to_rebuild() {
    let dir = tempfile::TempDir::new().unwrap();
    let settings = small_index_settings(dir.path());

    {
        let manager = build_manager(settings.clone());
        seed_texts(&manager, 7);
        manager.persist_index().unwrap();
    }

    let meta_path = dir.path().join("hnsw_index").join(INDEX_META_FILE);
    std::fs::write(&meta_path, "not json at all").unwrap();

    // Construction still succeeds: the unloadable index is logged and the
    // manager falls back to rebuilding from the (empty) record store.
    let manager = build_manager(settings);
    assert!(manager.ann_handle().is_none());
    assert!(manager.search_text("anything", None).unwrap().hits.is_empty());
}

#[test]
fn test_background_worker_applies_index_tasks() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = build_manager(small_index_settings(dir.path()));

    seed_texts(&manager, 6);
    assert!(manager.ann_handle().is_some());

    manager.start_worker();
    manager.add_text(7, "arrives through the worker", None, None).unwrap();
    // Dropping the queue drains it, so stopping guarantees completion.
    manager.stop_worker();

    let handle = manager.ann_handle().unwrap();
    assert_eq!(handle.read().item_count(), 7);
}

#[test]
fn test_rank_fusion_over_multiple_searches() {
    let dir = tempfile::TempDir::new().unwrap();
    let manager = build_manager(small_index_settings(dir.path()));

    manager.add_text(1, "rust systems programming", None, None).unwrap();
    manager.add_text(2, "rust web development", None, None).unwrap();
    manager.add_text(3, "gardening for beginners", None, None).unwrap();

    let by_systems = manager.search_text("rust systems programming", None).unwrap();
    let by_web = manager.search_text("rust web development", None).unwrap();

    let fused = rrf(
        vec![by_systems.hits, by_web.hits],
        |hit| u64::from(hit.record.id.get()),
    );

    assert_eq!(fused.len(), 3);
    // Both rust records beat the gardening record, which never ranks
    // first in either list.
    assert_ne!(fused[0].item.record.object_id, Some(3));
    assert_ne!(fused[1].item.record.object_id, Some(3));
    // Scores are descending.
    for pair in fused.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}
