//! Capability interface for source objects.
//!
//! Application records that want automatic vector syncing implement
//! [`VectorSource`]. Text extraction is required; metadata extraction is
//! optional, falling back to a generic serialization of the whole object
//! (flattened to a plain map with `model` and `pk` entries).

use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::types::JsonMap;

/// Capability interface a source object exposes to the vector store.
///
/// The `Serialize` bound powers the generic metadata fallback; types that
/// want richer metadata override [`VectorSource::get_metadata`].
pub trait VectorSource: Serialize {
    /// Collection kind this object belongs to (e.g. a table name).
    fn collection_kind(&self) -> &str;

    /// Identity of the object within its collection.
    fn object_id(&self) -> u64;

    /// The text that gets embedded for this object.
    fn get_text(&self) -> String;

    /// Structured metadata stored alongside the embedding.
    ///
    /// The default of `None` selects the generic serialization fallback.
    fn get_metadata(&self) -> Option<JsonMap> {
        None
    }
}

/// Generic metadata fallback: serialize the whole object into a flat map
/// carrying `model` and `pk` alongside the object's own fields.
pub fn serialize_source<T: VectorSource>(source: &T) -> StoreResult<JsonMap> {
    let value = serde_json::to_value(source)
        .map_err(|e| StoreError::Serialization(format!("failed to serialize source object: {e}")))?;

    let mut flattened = JsonMap::new();
    flattened.insert(
        "model".to_string(),
        serde_json::Value::String(source.collection_kind().to_string()),
    );
    flattened.insert("pk".to_string(), serde_json::json!(source.object_id()));

    match value {
        serde_json::Value::Object(fields) => {
            for (name, field_value) in fields {
                flattened.insert(name, field_value);
            }
        }
        other => {
            flattened.insert("value".to_string(), other);
        }
    }
    Ok(flattened)
}

/// Metadata for a source object: its own extraction when implemented,
/// the generic serialization otherwise.
pub fn extract_metadata<T: VectorSource>(source: &T) -> StoreResult<JsonMap> {
    match source.get_metadata() {
        Some(metadata) => Ok(metadata),
        None => serialize_source(source),
    }
}
