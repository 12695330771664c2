//! Keyed registry of live index handles.
//!
//! Guarantees at most one live handle per distinct construction parameter
//! set within a process. Parameters canonicalize to a stable cache key
//! (fields emitted in a fixed alphabetical order), so two call sites that
//! spell the same configuration differently still share a handle.
//!
//! The registry is an explicit context object with `new()`/`clear()`; it
//! has no eviction policy because one handle is expected per
//! collection/dimension/space combination. `should_not_cache` bypasses the
//! cache for short-lived indexes scoped to one query.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::index::exact::ExactIndex;
use crate::index::hnsw::HnswIndex;
use crate::index::DistanceSpace;
use crate::types::VectorDimension;

/// Construction parameters for a brute-force index.
#[derive(Debug, Clone, PartialEq)]
pub struct ExactParams {
    pub dimension: VectorDimension,
    pub capacity: usize,
    pub space: DistanceSpace,
    /// Bypass the cache entirely; used for per-query throwaway indexes.
    pub should_not_cache: bool,
}

impl ExactParams {
    fn cache_key(&self) -> String {
        format!(
            "exact:cap={}:dim={}:space={}",
            self.capacity,
            self.dimension.get(),
            self.space
        )
    }
}

/// Construction parameters for an approximate index.
#[derive(Debug, Clone, PartialEq)]
pub struct HnswParams {
    pub dimension: VectorDimension,
    pub capacity: usize,
    pub space: DistanceSpace,
    pub m: usize,
    pub ef_construction: usize,
    pub ef: usize,
    pub should_not_cache: bool,
}

impl HnswParams {
    fn cache_key(&self) -> String {
        format!(
            "hnsw:cap={}:dim={}:ef={}:efc={}:m={}:space={}",
            self.capacity,
            self.dimension.get(),
            self.ef,
            self.ef_construction,
            self.m,
            self.space
        )
    }
}

/// Process-wide cache of index handles keyed by canonicalized parameters.
#[derive(Debug, Default)]
pub struct IndexRegistry {
    exact: DashMap<String, Arc<RwLock<ExactIndex>>>,
    hnsw: DashMap<String, Arc<RwLock<HnswIndex>>>,
}

impl IndexRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached brute-force handle for `params`, constructing
    /// one if absent. `should_not_cache` always constructs a fresh one.
    pub fn exact(&self, params: &ExactParams) -> Arc<RwLock<ExactIndex>> {
        let build =
            || Arc::new(RwLock::new(ExactIndex::new(params.dimension, params.capacity, params.space)));
        if params.should_not_cache {
            return build();
        }
        self.exact
            .entry(params.cache_key())
            .or_insert_with(build)
            .clone()
    }

    /// Returns the cached approximate handle for `params`, constructing
    /// one if absent. `should_not_cache` always constructs a fresh one.
    pub fn hnsw(&self, params: &HnswParams) -> Arc<RwLock<HnswIndex>> {
        let build = || {
            Arc::new(RwLock::new(HnswIndex::new(
                params.dimension,
                params.capacity,
                params.space,
                params.m,
                params.ef_construction,
                params.ef,
            )))
        };
        if params.should_not_cache {
            return build();
        }
        self.hnsw
            .entry(params.cache_key())
            .or_insert_with(build)
            .clone()
    }

    /// Caches an already-built approximate handle (e.g. one loaded from
    /// disk) under its construction parameters.
    pub fn insert_hnsw(&self, params: &HnswParams, handle: Arc<RwLock<HnswIndex>>) {
        self.hnsw.insert(params.cache_key(), handle);
    }

    /// Number of cached handles of both kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.exact.len() + self.hnsw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Explicit teardown: drops every cached handle.
    pub fn clear(&self) {
        self.exact.clear();
        self.hnsw.clear();
    }
}
