//! Search orchestration.
//!
//! Resolves a query into an embedding, builds the candidate set, picks
//! the index path by candidate count, and maps returned labels back to
//! records ordered by ascending distance.
//!
//! Below the bruteforce ceiling, a fresh non-cached exact index is built
//! over exactly the candidate embeddings: an O(n) scan, but immune to any
//! staleness the incrementally-updated approximate index may have
//! accumulated. Above the ceiling, the shared approximate index is
//! searched with an allow-list restricting results to the candidates.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{StoreError, StoreResult};
use crate::index::{ExactParams, Neighbor};
use crate::store::manager::VectorStore;
use crate::store::record::{RecordStore, VectorRecord};
use crate::types::VectorId;

/// What to search for.
#[derive(Debug, Clone)]
pub enum SearchQuery {
    /// Raw text, embedded at query time.
    Text(String),
    /// Reference to a source object. When its vector is already stored,
    /// the stored embedding is reused and the object itself excluded
    /// from the results; otherwise `text_fallback` is embedded.
    Source {
        kind: String,
        object_id: u64,
        text_fallback: Option<String>,
    },
}

/// Collection filter accepted by the search entry point.
///
/// An unresolvable name or id is logged and treated as "no filter"
/// rather than failing the search.
#[derive(Debug, Clone)]
pub enum CollectionFilter {
    /// An already-resolved collection kind, trusted as-is.
    Kind(String),
    /// A kind name, checked against the kinds present in the store.
    Name(String),
    /// A numeric id: the position of the kind in the store's sorted
    /// distinct-kind list.
    Id(u32),
}

/// Knobs for one search call.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Result count; defaults to the configured maximum and is clamped
    /// to the candidate count.
    pub k: Option<usize>,
    pub filter: Option<CollectionFilter>,
    /// Query-time beam width override for the approximate path.
    pub ef: Option<usize>,
    /// Also dereference each hit to its source object, silently dropping
    /// any that no longer resolve.
    pub unwrap: bool,
}

/// One search result: the record and its distance to the query.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub record: VectorRecord,
    pub distance: f32,
}

/// A dereferenced source object with its distance, produced by `unwrap`.
#[derive(Debug, Clone)]
pub struct SourceHit {
    pub object: serde_json::Value,
    pub distance: f32,
}

/// Ordered search results plus the measured search time.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Hits ordered by ascending distance.
    pub hits: Vec<SearchHit>,
    /// Present when `unwrap` was requested.
    pub sources: Option<Vec<SourceHit>>,
    pub search_time: Duration,
}

fn resolve_filter(store: &dyn RecordStore, filter: &CollectionFilter) -> Option<String> {
    match filter {
        CollectionFilter::Kind(kind) => Some(kind.clone()),
        CollectionFilter::Name(name) => {
            if store.kinds().iter().any(|kind| kind == name) {
                Some(name.clone())
            } else {
                warn!(
                    filter = %name,
                    "unresolvable collection filter name, searching without a filter"
                );
                None
            }
        }
        CollectionFilter::Id(id) => match store.kinds().get(*id as usize) {
            Some(kind) => Some(kind.clone()),
            None => {
                warn!(
                    filter = *id,
                    "unresolvable collection filter id, searching without a filter"
                );
                None
            }
        },
    }
}

pub(crate) fn execute(
    manager: &VectorStore,
    query: &SearchQuery,
    opts: &SearchOptions,
) -> StoreResult<SearchOutcome> {
    let started = Instant::now();
    let store = manager.record_store();

    let filter_kind = opts
        .filter
        .as_ref()
        .and_then(|filter| resolve_filter(store, filter));

    // Resolve the query embedding, reusing a stored vector when the query
    // references an already-indexed source object.
    let (query_embedding, exclude, implied_kind) = match query {
        SearchQuery::Text(text) => (manager.embedder().embed(text)?, None, None),
        SearchQuery::Source {
            kind,
            object_id,
            text_fallback,
        } => match store.get_by_ref(Some(kind), *object_id) {
            Some(record) => (record.embedding, Some(record.id), Some(kind.clone())),
            None => match text_fallback {
                Some(text) => (manager.embedder().embed(text)?, None, Some(kind.clone())),
                None => {
                    return Err(StoreError::Validation(
                        "source object is not indexed and no query text was provided".to_string(),
                    ));
                }
            },
        },
    };
    manager.dimension().validate_vector(&query_embedding)?;

    // Collection filter first; a reference query implies its own kind
    // when no explicit filter was given.
    let effective_kind = filter_kind.or(implied_kind);
    let mut candidates = match &effective_kind {
        Some(kind) => store.by_kind(kind),
        None => store.all(),
    };
    if let Some(excluded) = exclude {
        candidates.retain(|record| record.id != excluded);
    }

    let candidate_count = candidates.len();
    if candidate_count == 0 {
        return Ok(SearchOutcome {
            hits: Vec::new(),
            sources: opts.unwrap.then(Vec::new),
            search_time: started.elapsed(),
        });
    }

    // k can never exceed the candidate count; that is not an error.
    let k = opts
        .k
        .unwrap_or(manager.settings().search.max_results)
        .min(candidate_count);

    let neighbors: Vec<Neighbor> =
        if candidate_count < manager.settings().search.bruteforce_ceiling {
            let params = ExactParams {
                dimension: manager.dimension(),
                capacity: candidate_count,
                space: manager.settings().index.space,
                should_not_cache: true,
            };
            let handle = manager.registry().exact(&params);
            let mut index = handle.write();
            let ids: Vec<VectorId> = candidates.iter().map(|record| record.id).collect();
            let embeddings: Vec<Vec<f32>> = candidates
                .iter()
                .map(|record| record.embedding.clone())
                .collect();
            index.add(&embeddings, &ids)?;
            index.search_one(&query_embedding, k, None, None)?
        } else {
            let handle = manager.ensure_ann_ready()?;
            let allow: HashSet<VectorId> = candidates.iter().map(|record| record.id).collect();
            let guard = handle.read();
            guard.search(&query_embedding, k, opts.ef, Some(&allow), None)?
        };

    // Map labels back to records; ids not among the returned labels are
    // dropped, and the rows arrive already ordered by distance.
    let mut by_id: HashMap<VectorId, VectorRecord> = candidates
        .into_iter()
        .map(|record| (record.id, record))
        .collect();
    let hits: Vec<SearchHit> = neighbors
        .iter()
        .filter_map(|neighbor| {
            by_id.remove(&neighbor.id).map(|record| SearchHit {
                record,
                distance: neighbor.distance,
            })
        })
        .collect();

    let sources = opts.unwrap.then(|| {
        hits.iter()
            .filter_map(|hit| {
                hit.record
                    .collection_ref()
                    .and_then(|(kind, object_id)| manager.resolve_source(kind, object_id))
                    .map(|object| SourceHit {
                        object,
                        distance: hit.distance,
                    })
            })
            .collect()
    });

    let search_time = started.elapsed();
    info!(
        elapsed_ms = search_time.as_secs_f64() * 1000.0,
        results = hits.len(),
        candidates = candidate_count,
        "search completed"
    );

    Ok(SearchOutcome {
        hits,
        sources,
        search_time,
    })
}
