//! Vector records and the record-store interface.
//!
//! A [`VectorRecord`] is a stored embedding plus text/metadata plus an
//! optional link to a source object. The relational backend lives behind
//! the [`RecordStore`] trait; this crate ships an in-memory
//! implementation and treats anything else as an external collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::types::{JsonMap, VectorId};

/// A stored embedding with its text, metadata and optional source link.
///
/// Invariants:
/// - `embedding` is never empty and always has the collection's
///   configured dimension.
/// - at most one record exists per `(collection_kind, object_id)` pair,
///   the null-collection scope included.
/// - `collection_kind` is only ever present together with `object_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: VectorId,
    pub embedding: Vec<f32>,
    pub text: String,
    pub metadata: JsonMap,
    pub collection_kind: Option<String>,
    pub object_id: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VectorRecord {
    /// The source-object reference, when this record was created from one.
    #[must_use]
    pub fn collection_ref(&self) -> Option<(&str, u64)> {
        match (&self.collection_kind, self.object_id) {
            (Some(kind), Some(object_id)) => Some((kind.as_str(), object_id)),
            _ => None,
        }
    }

    /// True when this record's identity matches the given scope.
    #[must_use]
    pub fn matches_ref(&self, kind: Option<&str>, object_id: u64) -> bool {
        self.collection_kind.as_deref() == kind && self.object_id == Some(object_id)
    }
}

/// Interface to the relational record store.
///
/// Implementations enforce the `(collection_kind, object_id)` uniqueness
/// constraint on insert, surfacing violations as
/// [`StoreError::Conflict`](crate::error::StoreError::Conflict).
pub trait RecordStore: Send + Sync {
    /// Allocates the next surrogate key.
    fn allocate_id(&self) -> VectorId;

    /// Inserts a new record. Duplicate identity is a conflict error and
    /// leaves the existing record untouched.
    fn insert(&self, record: VectorRecord) -> StoreResult<VectorRecord>;

    /// Replaces the record with the same id.
    fn update(&self, record: VectorRecord) -> StoreResult<VectorRecord>;

    fn get(&self, id: VectorId) -> Option<VectorRecord>;

    /// Looks up a record by its `(collection_kind, object_id)` identity;
    /// `kind = None` addresses the null-collection scope.
    fn get_by_ref(&self, kind: Option<&str>, object_id: u64) -> Option<VectorRecord>;

    /// Removes and returns the record with the given id.
    fn remove(&self, id: VectorId) -> Option<VectorRecord>;

    /// Every stored record, in surrogate-key order.
    fn all(&self) -> Vec<VectorRecord>;

    /// Records belonging to one collection kind, in surrogate-key order.
    fn by_kind(&self, kind: &str) -> Vec<VectorRecord>;

    /// Records whose metadata contains `value` at the `/`-separated
    /// sub-key path (e.g. `author/name`).
    fn by_metadata(&self, path: &str, value: &serde_json::Value) -> Vec<VectorRecord>;

    /// Distinct collection kinds, sorted. The position of a kind in this
    /// list is its stable numeric id for filter resolution.
    fn kinds(&self) -> Vec<String>;

    fn count(&self) -> usize;

    /// Removes every record.
    fn clear(&self);
}
