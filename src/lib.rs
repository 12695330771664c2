//! Embeddings, similarity search and hybrid retrieval for application
//! records.
//!
//! Records embed into fixed-dimension vectors and are retrieved by
//! similarity, backed by a pluggable record store. Small candidate sets
//! are scanned exactly; past a configurable ceiling, searches go through
//! a shared graph-based approximate index that is kept in sync with
//! record create/update/delete events and persisted across restarts.

pub mod config;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod index;
pub mod store;
pub mod tasks;
pub mod types;

// Explicit exports for better API clarity
pub use config::Settings;
pub use embedding::{EmbeddingGenerator, EmbeddingRegistry, FastEmbedGenerator};
pub use error::{
    ConfigError, EmbeddingError, EmbeddingResult, IndexError, IndexResult, StoreError, StoreResult,
};
pub use fusion::{Fused, reciprocal_rank_fusion, rrf};
pub use index::{DistanceSpace, ExactIndex, HnswIndex, IndexRegistry, Neighbor};
pub use store::{
    CollectionFilter, MemoryRecordStore, RecordStore, SearchHit, SearchOptions, SearchOutcome,
    SearchQuery, VectorRecord, VectorSource, VectorStore,
};
pub use types::{JsonMap, VectorDimension, VectorId};
