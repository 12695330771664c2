//! In-memory record store.
//!
//! Reference implementation of [`RecordStore`] used by tests and
//! embedded deployments. A relational backend implements the same trait
//! outside this crate.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::store::record::{RecordStore, VectorRecord};
use crate::types::VectorId;

/// Thread-safe in-memory record store keyed by surrogate id.
#[derive(Debug)]
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<u32, VectorRecord>>,
    next_id: AtomicU32,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            // Surrogate keys start at 1: zero ids are not representable.
            next_id: AtomicU32::new(1),
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn allocate_id(&self) -> VectorId {
        let raw = self.next_id.fetch_add(1, Ordering::SeqCst);
        VectorId::new_unchecked(raw)
    }

    fn insert(&self, record: VectorRecord) -> StoreResult<VectorRecord> {
        let mut records = self.records.write();

        if let Some(object_id) = record.object_id {
            let duplicate = records.values().any(|existing| {
                existing.matches_ref(record.collection_kind.as_deref(), object_id)
            });
            if duplicate {
                return Err(StoreError::Conflict {
                    object_id,
                    collection: record.collection_kind.clone(),
                });
            }
        }

        records.insert(record.id.get(), record.clone());
        Ok(record)
    }

    fn update(&self, record: VectorRecord) -> StoreResult<VectorRecord> {
        let mut records = self.records.write();
        if !records.contains_key(&record.id.get()) {
            return Err(StoreError::RecordNotFound(record.id));
        }
        records.insert(record.id.get(), record.clone());
        Ok(record)
    }

    fn get(&self, id: VectorId) -> Option<VectorRecord> {
        self.records.read().get(&id.get()).cloned()
    }

    fn get_by_ref(&self, kind: Option<&str>, object_id: u64) -> Option<VectorRecord> {
        self.records
            .read()
            .values()
            .find(|record| record.matches_ref(kind, object_id))
            .cloned()
    }

    fn remove(&self, id: VectorId) -> Option<VectorRecord> {
        self.records.write().remove(&id.get())
    }

    fn all(&self) -> Vec<VectorRecord> {
        self.records.read().values().cloned().collect()
    }

    fn by_kind(&self, kind: &str) -> Vec<VectorRecord> {
        self.records
            .read()
            .values()
            .filter(|record| record.collection_kind.as_deref() == Some(kind))
            .cloned()
            .collect()
    }

    fn by_metadata(&self, path: &str, value: &serde_json::Value) -> Vec<VectorRecord> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.records
            .read()
            .values()
            .filter(|record| {
                let mut current: Option<&serde_json::Value> = None;
                for (i, segment) in segments.iter().enumerate() {
                    current = if i == 0 {
                        record.metadata.get(*segment)
                    } else {
                        current.and_then(|v| v.get(*segment))
                    };
                    if current.is_none() {
                        return false;
                    }
                }
                current == Some(value)
            })
            .cloned()
            .collect()
    }

    fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .records
            .read()
            .values()
            .filter_map(|record| record.collection_kind.clone())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    fn count(&self) -> usize {
        self.records.read().len()
    }

    fn clear(&self) {
        self.records.write().clear();
    }
}
