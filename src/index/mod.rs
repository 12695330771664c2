//! Similarity indexes for vector search.
//!
//! Two index families share one contract: a brute-force [`ExactIndex`]
//! used below the bruteforce ceiling (and for re-scoring filtered
//! subsets), and a graph-based [`HnswIndex`] for large record sets.
//! Both persist as a directory of index body plus descriptor sidecar,
//! and both are handed out through the [`IndexRegistry`].

mod descriptor;
mod exact;
mod hnsw;
mod registry;
mod space;

pub use descriptor::{INDEX_BODY_FILE, INDEX_META_FILE, IndexDescriptor};
pub use exact::ExactIndex;
pub use hnsw::HnswIndex;
pub use registry::{ExactParams, HnswParams, IndexRegistry};
pub use space::{DistanceSpace, cosine_distance, cosine_similarity, squared_euclidean};

use crate::types::VectorId;

/// Capacity multiplier applied when an add would overflow an index.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.2;

/// One search hit: a stored id and its distance to the query.
///
/// Lower distance is more similar in both spaces, so result rows sort
/// ascending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: VectorId,
    pub distance: f32,
}

impl Neighbor {
    /// Create a new search hit.
    #[must_use]
    pub const fn new(id: VectorId, distance: f32) -> Self {
        Self { id, distance }
    }
}
