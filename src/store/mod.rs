//! Vector records, their store, and the manager that keeps embeddings
//! consistent with an evolving record set.

mod manager;
pub mod memory;
mod query;
mod record;
mod source;
mod validate;

pub use manager::{
    INDEX_SUBDIR, SavedOutcome, SourceResolver, SyncReport, VectorStore,
};
pub use memory::MemoryRecordStore;
pub use query::{
    CollectionFilter, SearchHit, SearchOptions, SearchOutcome, SearchQuery, SourceHit,
};
pub use record::{RecordStore, VectorRecord};
pub use source::{VectorSource, extract_metadata, serialize_source};
pub use validate::{ContentRef, NewVector, validate_new_vector};
