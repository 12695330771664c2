//! Validation of new vector records.
//!
//! Runs before anything is written: a failed validation aborts the
//! operation with no partial state. Duplicate identity surfaces as a
//! conflict, distinct from plain validation failures.

use crate::error::{StoreError, StoreResult};
use crate::store::record::RecordStore;
use crate::types::JsonMap;

/// A resolved reference to a source object, carrying everything the
/// record needs from it.
#[derive(Debug, Clone)]
pub struct ContentRef {
    pub kind: String,
    pub object_id: u64,
    pub text: String,
    pub metadata: Option<JsonMap>,
}

/// Input to [`crate::store::VectorStore::create`].
#[derive(Debug, Clone, Default)]
pub struct NewVector {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<JsonMap>,
    /// Present when the record is created from a source object.
    pub content: Option<ContentRef>,
    /// Explicit identity for records created from bare text.
    pub object_id: Option<u64>,
}

/// Validates a new record and resolves its effective text.
///
/// Checks, in order:
/// - either `text` or a content reference must be present;
/// - missing text derives from the content reference;
/// - `object_id` is required when no content reference is given;
/// - when both a content reference and an explicit `object_id` are
///   given, their ids must agree;
/// - a bare-text record whose `(collection_kind = null, object_id)` pair
///   collides with an existing record is a conflict, not an overwrite.
pub fn validate_new_vector(store: &dyn RecordStore, new: &NewVector) -> StoreResult<String> {
    let text = match (&new.text, &new.content) {
        (None, None) => {
            return Err(StoreError::Validation(
                "either text or a content object must be provided".to_string(),
            ));
        }
        (Some(text), _) => text.clone(),
        (None, Some(content)) => content.text.clone(),
    };

    if new.content.is_none() && new.object_id.is_none() {
        return Err(StoreError::Validation(
            "object_id must be provided when no content object is given".to_string(),
        ));
    }

    if let (Some(content), Some(object_id)) = (&new.content, new.object_id) {
        if content.object_id != object_id {
            return Err(StoreError::Validation(format!(
                "content object id {} does not match the supplied object_id {}",
                content.object_id, object_id
            )));
        }
    }

    if new.content.is_none() {
        if let Some(object_id) = new.object_id {
            if store.get_by_ref(None, object_id).is_some() {
                return Err(StoreError::Conflict {
                    object_id,
                    collection: None,
                });
            }
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryRecordStore;
    use chrono::Utc;
    use crate::store::record::VectorRecord;

    fn content(object_id: u64) -> ContentRef {
        ContentRef {
            kind: "post".to_string(),
            object_id,
            text: "derived text".to_string(),
            metadata: None,
        }
    }

    #[test]
    fn test_text_or_content_required() {
        let store = MemoryRecordStore::new();
        let err = validate_new_vector(&store, &NewVector::default()).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_text_derives_from_content() {
        let store = MemoryRecordStore::new();
        let new = NewVector {
            content: Some(content(1)),
            ..Default::default()
        };
        assert_eq!(validate_new_vector(&store, &new).unwrap(), "derived text");
    }

    #[test]
    fn test_object_id_required_without_content() {
        let store = MemoryRecordStore::new();
        let new = NewVector {
            text: Some("bare text".to_string()),
            ..Default::default()
        };
        let err = validate_new_vector(&store, &new).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn test_mismatched_ids_rejected() {
        let store = MemoryRecordStore::new();
        let new = NewVector {
            content: Some(content(1)),
            object_id: Some(2),
            ..Default::default()
        };
        let err = validate_new_vector(&store, &new).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let agreeing = NewVector {
            content: Some(content(1)),
            object_id: Some(1),
            ..Default::default()
        };
        assert!(validate_new_vector(&store, &agreeing).is_ok());
    }

    #[test]
    fn test_null_collection_duplicate_is_conflict() {
        let store = MemoryRecordStore::new();
        let now = Utc::now();
        store
            .insert(VectorRecord {
                id: store.allocate_id(),
                embedding: vec![0.0],
                text: "existing".to_string(),
                metadata: JsonMap::new(),
                collection_kind: None,
                object_id: Some(42),
                created_at: now,
                updated_at: now,
            })
            .unwrap();

        let new = NewVector {
            text: Some("newcomer".to_string()),
            object_id: Some(42),
            ..Default::default()
        };
        let err = validate_new_vector(&store, &new).unwrap_err();
        assert!(err.is_conflict());
    }
}
