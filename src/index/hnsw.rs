//! Graph-based approximate nearest-neighbor index.
//!
//! HNSW (Hierarchical Navigable Small World) with incremental add, update,
//! soft delete and in-place capacity growth. Deleted ids are tombstoned:
//! they stay in the graph for navigation, are never returned by search, and
//! their slot is reused when the same id is added again.
//!
//! The structure is not safe for concurrent structural mutation; the owning
//! manager serializes writers behind a lock (see `store::manager`).

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::index::descriptor::IndexDescriptor;
use crate::index::{DistanceSpace, Neighbor};
use crate::types::{VectorDimension, VectorId};

/// Hard cap on node levels to prevent pathological cases.
const MAX_LEVEL: usize = 16;

/// Fixed PRNG seed so graph construction is reproducible.
const LEVEL_SEED: u64 = 42;

/// Graph node: one embedding plus its per-layer adjacency lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HnswNode {
    id: VectorId,
    embedding: Vec<f32>,
    max_layer: usize,
    /// `connections[layer]` = neighbor ids at that layer.
    connections: Vec<Vec<VectorId>>,
}

impl HnswNode {
    fn new(id: VectorId, embedding: Vec<f32>, max_layer: usize) -> Self {
        let connections = vec![Vec::new(); max_layer + 1];
        Self {
            id,
            embedding,
            max_layer,
            connections,
        }
    }

    fn connections_at(&self, layer: usize) -> &[VectorId] {
        self.connections.get(layer).map_or(&[], |c| c.as_slice())
    }

    fn add_connection(&mut self, layer: usize, neighbor: VectorId) {
        if layer < self.connections.len() && !self.connections[layer].contains(&neighbor) {
            self.connections[layer].push(neighbor);
        }
    }

    fn remove_connection(&mut self, layer: usize, neighbor: VectorId) {
        if layer < self.connections.len() {
            self.connections[layer].retain(|&id| id != neighbor);
        }
    }

    fn set_connections(&mut self, layer: usize, neighbors: Vec<VectorId>) {
        if layer < self.connections.len() {
            self.connections[layer] = neighbors;
        }
    }
}

/// A candidate during greedy search, ordered as a min-heap on distance.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    id: VectorId,
    distance: f32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.distance == other.distance && self.id == other.id
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (smallest distance first).
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Max-heap wrapper tracking the worst element of the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaxCandidate(Candidate);

impl PartialOrd for MaxCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MaxCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .distance
            .partial_cmp(&other.0.distance)
            .unwrap_or(Ordering::Equal)
    }
}

/// Level generator using the exponential distribution from the HNSW paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LevelGenerator {
    ml: f64,
    rng_state: u64,
}

impl LevelGenerator {
    fn new(m: usize) -> Self {
        Self {
            ml: 1.0 / (m.max(2) as f64).ln(),
            rng_state: LEVEL_SEED,
        }
    }

    fn generate_level(&mut self) -> usize {
        // xorshift64
        let mut x = self.rng_state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng_state = x;

        let uniform = (x as f64) / (u64::MAX as f64);
        let level = (-uniform.ln() * self.ml).floor() as usize;
        level.min(MAX_LEVEL)
    }
}

/// Serialized graph body written next to the descriptor sidecar.
#[derive(Serialize, Deserialize)]
struct GraphBody {
    nodes: Vec<HnswNode>,
    entry_point: Option<VectorId>,
    max_layer: usize,
    tombstones: Vec<VectorId>,
    level_gen: LevelGenerator,
}

/// Approximate nearest-neighbor index over a layered proximity graph.
#[derive(Debug)]
pub struct HnswIndex {
    dimension: VectorDimension,
    capacity: usize,
    space: DistanceSpace,
    m: usize,
    ef_construction: usize,
    ef: usize,
    growth_factor: f64,

    nodes: HashMap<VectorId, HnswNode>,
    entry_point: Option<VectorId>,
    max_layer: usize,
    tombstones: HashSet<VectorId>,
    level_gen: LevelGenerator,
}

impl HnswIndex {
    /// Creates an empty index. `m`, `ef_construction` and the default `ef`
    /// are fixed for the lifetime of the index and persisted with it.
    #[must_use]
    pub fn new(
        dimension: VectorDimension,
        capacity: usize,
        space: DistanceSpace,
        m: usize,
        ef_construction: usize,
        ef: usize,
    ) -> Self {
        Self {
            dimension,
            capacity,
            space,
            m,
            ef_construction,
            ef,
            growth_factor: crate::index::DEFAULT_GROWTH_FACTOR,
            nodes: HashMap::new(),
            entry_point: None,
            max_layer: 0,
            tombstones: HashSet::new(),
            level_gen: LevelGenerator::new(m),
        }
    }

    /// Overrides the capacity growth multiplier (default 1.2).
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Number of occupied slots, tombstoned ones included: a soft-deleted
    /// id keeps consuming capacity until its slot is reused.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of ids currently returnable by search.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.tombstones.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn space(&self) -> DistanceSpace {
        self.space
    }

    /// Graph parameters fixed at construction: `(m, ef_construction, ef)`.
    #[must_use]
    pub fn params(&self) -> (usize, usize, usize) {
        (self.m, self.ef_construction, self.ef)
    }

    /// True when the id is present and tombstoned.
    #[must_use]
    pub fn is_deleted(&self, id: VectorId) -> bool {
        self.tombstones.contains(&id)
    }

    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.space.distance(a, b)
    }

    /// Adds vectors with caller-supplied ids.
    ///
    /// An id matching a tombstoned slot reuses that slot instead of
    /// consuming new capacity; an id already live is re-linked in place.
    /// Capacity grows by the configured factor when the batch would
    /// overflow it.
    pub fn add(&mut self, embeddings: &[Vec<f32>], ids: &[VectorId]) -> IndexResult<()> {
        if embeddings.len() != ids.len() {
            return Err(IndexError::LengthMismatch {
                embeddings: embeddings.len(),
                ids: ids.len(),
            });
        }
        for embedding in embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        let new_slots = ids
            .iter()
            .filter(|id| !self.nodes.contains_key(*id))
            .count();
        if self.nodes.len() + new_slots > self.capacity {
            self.resize_for(self.nodes.len() + new_slots);
        }

        for (id, embedding) in ids.iter().zip(embeddings) {
            if self.nodes.contains_key(id) {
                // Slot reuse (tombstoned) or in-place re-link (live).
                self.unlink(*id);
                self.tombstones.remove(id);
            }
            self.insert_linked(*id, embedding.clone());
        }
        Ok(())
    }

    /// Re-embeds existing ids in place.
    ///
    /// Errors on an id that was never added; tombstoned ids are revived.
    pub fn update(&mut self, embeddings: &[Vec<f32>], ids: &[VectorId]) -> IndexResult<()> {
        if embeddings.len() != ids.len() {
            return Err(IndexError::LengthMismatch {
                embeddings: embeddings.len(),
                ids: ids.len(),
            });
        }
        for id in ids {
            if !self.nodes.contains_key(id) {
                return Err(IndexError::UnknownId(*id));
            }
        }
        self.add(embeddings, ids)
    }

    /// Soft-deletes ids: marked, never returned by search, slot kept
    /// until reused. Errors on an id that was never added.
    pub fn delete(&mut self, ids: &[VectorId]) -> IndexResult<()> {
        for id in ids {
            if !self.nodes.contains_key(id) {
                return Err(IndexError::UnknownId(*id));
            }
        }
        self.tombstones.extend(ids.iter().copied());
        Ok(())
    }

    /// Grows capacity in place without rebuilding the graph.
    pub fn resize(&mut self) {
        self.resize_for(self.nodes.len() + 1);
    }

    fn resize_for(&mut self, needed: usize) {
        let grown = (self.nodes.len().max(self.capacity) as f64 * self.growth_factor).ceil()
            as usize;
        self.capacity = grown.max(needed);
    }

    /// Clears all entries, keeping the construction parameters.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.tombstones.clear();
        self.entry_point = None;
        self.max_layer = 0;
        self.level_gen = LevelGenerator::new(self.m);
    }

    /// Searches the k nearest live neighbors of `query`.
    ///
    /// `ef` overrides the query-time beam width for this call only.
    /// `allow`/`deny` restrict which ids may be returned; tombstoned ids
    /// are always excluded, though the graph still navigates through them.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: Option<usize>,
        allow: Option<&HashSet<VectorId>>,
        deny: Option<&HashSet<VectorId>>,
    ) -> IndexResult<Vec<Neighbor>> {
        self.dimension.validate_vector(query)?;

        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };

        // Greedy descent through the upper layers.
        let mut current_ep = vec![entry];
        for layer in (1..=self.max_layer).rev() {
            let found = self.search_layer(query, &current_ep, 1, layer, None);
            if !found.is_empty() {
                current_ep = found.into_iter().map(|c| c.id).collect();
            }
        }

        let ef = ef.unwrap_or(self.ef).max(k);
        let passes = |id: VectorId| -> bool {
            !self.tombstones.contains(&id)
                && allow.is_none_or(|set| set.contains(&id))
                && deny.is_none_or(|set| !set.contains(&id))
        };

        let mut results = self.search_layer(query, &current_ep, ef, 0, Some(&passes));
        results.truncate(k);
        Ok(results
            .into_iter()
            .map(|c| Neighbor::new(c.id, c.distance))
            .collect())
    }

    /// Greedy beam search within one layer.
    ///
    /// `result_filter` constrains what may be collected as a result;
    /// navigation still traverses filtered-out nodes.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[VectorId],
        ef: usize,
        layer: usize,
        result_filter: Option<&dyn Fn(VectorId) -> bool>,
    ) -> Vec<Candidate> {
        let mut candidates: BinaryHeap<Candidate> = BinaryHeap::new();
        let mut results: BinaryHeap<MaxCandidate> = BinaryHeap::new();
        let mut visited: HashSet<VectorId> = HashSet::new();

        let passes = |id: VectorId| result_filter.is_none_or(|f| f(id));

        for &ep in entry_points {
            let Some(node) = self.nodes.get(&ep) else {
                continue;
            };
            visited.insert(ep);
            let candidate = Candidate {
                id: ep,
                distance: self.distance(query, &node.embedding),
            };
            candidates.push(candidate);
            if passes(ep) {
                results.push(MaxCandidate(candidate));
            }
        }

        while let Some(current) = candidates.pop() {
            let furthest = if results.len() >= ef {
                results.peek().map_or(f32::INFINITY, |c| c.0.distance)
            } else {
                f32::INFINITY
            };
            if current.distance > furthest {
                break;
            }

            let Some(node) = self.nodes.get(&current.id) else {
                continue;
            };
            for &neighbor_id in node.connections_at(layer) {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let Some(neighbor) = self.nodes.get(&neighbor_id) else {
                    continue;
                };
                let neighbor_dist = self.distance(query, &neighbor.embedding);
                let furthest = if results.len() >= ef {
                    results.peek().map_or(f32::INFINITY, |c| c.0.distance)
                } else {
                    f32::INFINITY
                };

                if results.len() < ef || neighbor_dist < furthest {
                    let candidate = Candidate {
                        id: neighbor_id,
                        distance: neighbor_dist,
                    };
                    candidates.push(candidate);
                    if passes(neighbor_id) {
                        results.push(MaxCandidate(candidate));
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut out: Vec<Candidate> = results.into_iter().map(|mc| mc.0).collect();
        out.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        out
    }

    /// Select neighbors preferring diversity (heuristic from the HNSW
    /// paper): a candidate closer to an already-selected node than to the
    /// query is skipped in the first pass.
    fn select_neighbors(&self, candidates: &[Candidate], m: usize) -> Vec<VectorId> {
        if candidates.len() <= m {
            return candidates.iter().map(|c| c.id).collect();
        }

        let mut ordered: Vec<Candidate> = candidates.to_vec();
        ordered.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));

        let mut selected: Vec<VectorId> = Vec::with_capacity(m);
        for candidate in &ordered {
            if selected.len() >= m {
                break;
            }
            let Some(candidate_node) = self.nodes.get(&candidate.id) else {
                continue;
            };

            let mut diverse = true;
            for &chosen in &selected {
                if let Some(chosen_node) = self.nodes.get(&chosen) {
                    let dist = self.distance(&candidate_node.embedding, &chosen_node.embedding);
                    if dist < candidate.distance {
                        diverse = false;
                        break;
                    }
                }
            }
            if diverse || selected.is_empty() {
                selected.push(candidate.id);
            }
        }

        // Backfill with the closest remaining candidates.
        for candidate in &ordered {
            if selected.len() >= m {
                break;
            }
            if !selected.contains(&candidate.id) {
                selected.push(candidate.id);
            }
        }
        selected
    }

    /// Insert a node and wire it into every layer (Algorithm 1).
    fn insert_linked(&mut self, id: VectorId, embedding: Vec<f32>) {
        let node_level = self.level_gen.generate_level();
        let new_node = HnswNode::new(id, embedding.clone(), node_level);

        let Some(entry) = self.entry_point else {
            self.nodes.insert(id, new_node);
            self.entry_point = Some(id);
            self.max_layer = node_level;
            return;
        };

        let current_max_layer = self.max_layer;
        let mut current_ep = vec![entry];

        for layer in (node_level + 1..=current_max_layer).rev() {
            let found = self.search_layer(&embedding, &current_ep, 1, layer, None);
            if !found.is_empty() {
                current_ep = found.into_iter().map(|c| c.id).collect();
            }
        }

        self.nodes.insert(id, new_node);

        let start_layer = node_level.min(current_max_layer);
        for layer in (0..=start_layer).rev() {
            let found =
                self.search_layer(&embedding, &current_ep, self.ef_construction, layer, None);
            let neighbors = self.select_neighbors(&found, self.m);

            if let Some(node) = self.nodes.get_mut(&id) {
                node.set_connections(layer, neighbors.clone());
            }

            let mut neighbors_to_prune = Vec::new();
            for &neighbor_id in &neighbors {
                if neighbor_id == id {
                    continue;
                }
                if let Some(neighbor) = self.nodes.get_mut(&neighbor_id) {
                    neighbor.add_connection(layer, id);
                    if neighbor.connections_at(layer).len() > self.m {
                        neighbors_to_prune.push((
                            neighbor_id,
                            neighbor.connections_at(layer).to_vec(),
                            neighbor.embedding.clone(),
                        ));
                    }
                }
            }

            for (neighbor_id, conn_ids, neighbor_embedding) in neighbors_to_prune {
                let conn_candidates: Vec<Candidate> = conn_ids
                    .iter()
                    .filter_map(|&cid| {
                        self.nodes.get(&cid).map(|n| Candidate {
                            id: cid,
                            distance: self.distance(&neighbor_embedding, &n.embedding),
                        })
                    })
                    .collect();
                let pruned = self.select_neighbors(&conn_candidates, self.m);
                if let Some(neighbor) = self.nodes.get_mut(&neighbor_id) {
                    neighbor.set_connections(layer, pruned);
                }
            }

            if !found.is_empty() {
                current_ep = found.into_iter().map(|c| c.id).collect();
            }
        }

        if node_level > current_max_layer {
            self.entry_point = Some(id);
            self.max_layer = node_level;
        }
    }

    /// Detach a node from the graph ahead of re-insertion.
    fn unlink(&mut self, id: VectorId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        for layer in 0..=node.max_layer {
            for &neighbor_id in node.connections_at(layer) {
                if let Some(neighbor) = self.nodes.get_mut(&neighbor_id) {
                    neighbor.remove_connection(layer, id);
                }
            }
        }
        if self.entry_point == Some(id) {
            let new_entry = self
                .nodes
                .iter()
                .max_by_key(|(_, n)| n.max_layer)
                .map(|(&nid, n)| (nid, n.max_layer));
            match new_entry {
                Some((nid, layer)) => {
                    self.entry_point = Some(nid);
                    self.max_layer = layer;
                }
                None => {
                    self.entry_point = None;
                    self.max_layer = 0;
                }
            }
        }
    }

    /// Writes the graph body and its descriptor sidecar into `directory`.
    ///
    /// Callers must hold the index's write lock across this call:
    /// persisting concurrently with a mutation produces an undefined
    /// snapshot.
    pub fn persist(&self, directory: &Path) -> IndexResult<()> {
        let descriptor = IndexDescriptor::approximate(
            self.dimension,
            self.capacity,
            self.space,
            self.m,
            self.ef_construction,
            self.ef,
        );
        descriptor.save(directory)?;

        let body = GraphBody {
            nodes: self.nodes.values().cloned().collect(),
            entry_point: self.entry_point,
            max_layer: self.max_layer,
            tombstones: self.tombstones.iter().copied().collect(),
            level_gen: self.level_gen.clone(),
        };
        let body_path = IndexDescriptor::body_path(directory);
        let bytes = bincode::serde::encode_to_vec(&body, bincode::config::standard()).map_err(
            |e| IndexError::Persist {
                path: body_path.clone(),
                source: Box::new(e),
            },
        )?;
        std::fs::write(&body_path, bytes)?;
        Ok(())
    }

    /// Reconstructs an index from `directory`, reading the sidecar first.
    pub fn load(directory: &Path) -> IndexResult<Self> {
        let descriptor = IndexDescriptor::load(directory)?;
        let meta_path = directory.join(super::descriptor::INDEX_META_FILE);
        let (Some(m), Some(ef_construction), Some(ef)) =
            (descriptor.m, descriptor.ef_construction, descriptor.ef)
        else {
            return Err(IndexError::Load {
                path: meta_path,
                reason: "descriptor is missing graph parameters".to_string(),
            });
        };
        let dimension = VectorDimension::new(descriptor.dimension)?;

        let body_path = IndexDescriptor::body_path(directory);
        let bytes = std::fs::read(&body_path).map_err(|e| IndexError::Load {
            path: body_path.clone(),
            reason: format!("missing index body: {e}"),
        })?;
        let (body, _): (GraphBody, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| IndexError::Corrupt {
                    reason: format!("undecodable graph body: {e}"),
                },
            )?;

        let mut index = Self::new(
            dimension,
            descriptor.capacity,
            descriptor.space,
            m,
            ef_construction,
            ef,
        );
        for node in &body.nodes {
            if node.embedding.len() != dimension.get() {
                return Err(IndexError::Corrupt {
                    reason: format!(
                        "node {} has dimension {} but descriptor says {}",
                        node.id,
                        node.embedding.len(),
                        dimension.get()
                    ),
                });
            }
        }
        index.nodes = body.nodes.into_iter().map(|n| (n.id, n)).collect();
        index.entry_point = body.entry_point;
        index.max_layer = body.max_layer;
        index.tombstones = body.tombstones.into_iter().collect();
        index.level_gen = body.level_gen;
        Ok(index)
    }

    /// Like [`HnswIndex::load`], but fails fast when the persisted
    /// dimension or space differ from what the caller expects.
    pub fn load_expecting(
        directory: &Path,
        dimension: VectorDimension,
        space: DistanceSpace,
    ) -> IndexResult<Self> {
        let descriptor = IndexDescriptor::load(directory)?;
        descriptor.expect_compatible(dimension, space)?;
        Self::load(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vid(raw: u32) -> VectorId {
        VectorId::new_unchecked(raw)
    }

    fn unit_circle_vectors(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| {
                let angle = i as f32 * std::f32::consts::PI * 2.0 / n as f32;
                let mut v = vec![0.0; dim];
                v[0] = angle.cos();
                v[1] = angle.sin();
                v
            })
            .collect()
    }

    fn build_index(vectors: &[Vec<f32>]) -> HnswIndex {
        let dimension = VectorDimension::new(vectors[0].len()).unwrap();
        let mut index = HnswIndex::new(dimension, vectors.len(), DistanceSpace::L2, 16, 64, 32);
        let ids: Vec<VectorId> = (1..=vectors.len() as u32).map(vid).collect();
        index.add(&vectors.to_vec(), &ids).unwrap();
        index
    }

    #[test]
    fn test_empty_index_search() {
        let dimension = VectorDimension::new(4).unwrap();
        let index = HnswIndex::new(dimension, 10, DistanceSpace::L2, 16, 64, 32);
        let results = index.search(&[0.0; 4], 5, None, None, None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_add_and_search_finds_nearest() {
        let vectors = unit_circle_vectors(64, 8);
        let index = build_index(&vectors);

        for (i, query) in vectors.iter().enumerate().step_by(7) {
            let results = index.search(query, 1, None, None, None).unwrap();
            assert_eq!(results[0].id, vid(i as u32 + 1), "query {i} self-match");
        }
    }

    #[test]
    fn test_results_sorted_by_distance() {
        let vectors = unit_circle_vectors(32, 4);
        let index = build_index(&vectors);

        let results = index.search(&vectors[0], 10, None, None, None).unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn test_deleted_id_never_returned() {
        let vectors = unit_circle_vectors(16, 4);
        let mut index = build_index(&vectors);
        let victim = vid(3);

        index.delete(&[victim]).unwrap();
        assert!(index.is_deleted(victim));
        // Bookkeeping still reflects the tombstoned slot.
        assert_eq!(index.item_count(), 16);
        assert_eq!(index.live_count(), 15);

        for query in &vectors {
            let results = index.search(query, 16, None, None, None).unwrap();
            assert!(results.iter().all(|n| n.id != victim));
        }
    }

    #[test]
    fn test_delete_unknown_id_is_error() {
        let vectors = unit_circle_vectors(8, 4);
        let mut index = build_index(&vectors);
        assert!(matches!(
            index.delete(&[vid(99)]),
            Err(IndexError::UnknownId(_))
        ));
    }

    #[test]
    fn test_tombstoned_slot_is_reused() {
        let vectors = unit_circle_vectors(8, 4);
        let mut index = build_index(&vectors);

        index.delete(&[vid(5)]).unwrap();
        assert_eq!(index.item_count(), 8);

        // Re-adding the same id revives the slot without growing.
        index.add(&[vec![0.5, 0.5, 0.0, 0.0]], &[vid(5)]).unwrap();
        assert_eq!(index.item_count(), 8);
        assert!(!index.is_deleted(vid(5)));

        let results = index.search(&[0.5, 0.5, 0.0, 0.0], 1, None, None, None).unwrap();
        assert_eq!(results[0].id, vid(5));
    }

    #[test]
    fn test_update_reembeds_in_place() {
        let vectors = unit_circle_vectors(8, 4);
        let mut index = build_index(&vectors);

        let moved = vec![9.0, 9.0, 9.0, 9.0];
        index.update(&[moved.clone()], &[vid(2)]).unwrap();
        assert_eq!(index.item_count(), 8);

        let results = index.search(&moved, 1, None, None, None).unwrap();
        assert_eq!(results[0].id, vid(2));
    }

    #[test]
    fn test_update_unknown_id_is_error() {
        let vectors = unit_circle_vectors(8, 4);
        let mut index = build_index(&vectors);
        assert!(matches!(
            index.update(&[vec![0.0; 4]], &[vid(77)]),
            Err(IndexError::UnknownId(_))
        ));
    }

    #[test]
    fn test_capacity_auto_grows() {
        let dimension = VectorDimension::new(4).unwrap();
        let mut index = HnswIndex::new(dimension, 4, DistanceSpace::L2, 8, 32, 16);

        let vectors = unit_circle_vectors(10, 4);
        let ids: Vec<VectorId> = (1..=10).map(vid).collect();
        index.add(&vectors, &ids).unwrap();

        assert_eq!(index.item_count(), 10);
        assert!(index.capacity() >= 10);
    }

    #[test]
    fn test_allow_list_restricts_results() {
        let vectors = unit_circle_vectors(16, 4);
        let index = build_index(&vectors);

        let allow: HashSet<VectorId> = [vid(10), vid(11)].into_iter().collect();
        let results = index
            .search(&vectors[0], 16, None, Some(&allow), None)
            .unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|n| allow.contains(&n.id)));
    }

    #[test]
    fn test_reset_clears_everything() {
        let vectors = unit_circle_vectors(8, 4);
        let mut index = build_index(&vectors);

        index.reset();
        assert_eq!(index.item_count(), 0);
        assert!(index.search(&vectors[0], 5, None, None, None).unwrap().is_empty());

        // Still usable afterwards.
        index.add(&[vectors[0].clone()], &[vid(1)]).unwrap();
        assert_eq!(index.item_count(), 1);
    }

    #[test]
    fn test_persist_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let vectors = unit_circle_vectors(24, 4);
        let mut index = build_index(&vectors);
        index.delete(&[vid(7)]).unwrap();

        index.persist(dir.path()).unwrap();
        let loaded = HnswIndex::load(dir.path()).unwrap();

        assert_eq!(loaded.dimension(), index.dimension());
        assert_eq!(loaded.space(), index.space());
        assert_eq!(loaded.params(), index.params());
        assert_eq!(loaded.item_count(), 24);
        assert!(loaded.is_deleted(vid(7)));

        let results = loaded.search(&vectors[0], 5, None, None, None).unwrap();
        assert_eq!(results[0].id, vid(1));
    }

    #[test]
    fn test_load_rejects_mismatched_expectation() {
        let dir = TempDir::new().unwrap();
        let vectors = unit_circle_vectors(8, 4);
        let index = build_index(&vectors);
        index.persist(dir.path()).unwrap();

        let wrong = VectorDimension::new(8).unwrap();
        assert!(HnswIndex::load_expecting(dir.path(), wrong, DistanceSpace::L2).is_err());

        let right = VectorDimension::new(4).unwrap();
        assert!(
            HnswIndex::load_expecting(dir.path(), right, DistanceSpace::Cosine).is_err()
        );
        assert!(HnswIndex::load_expecting(dir.path(), right, DistanceSpace::L2).is_ok());
    }

    #[test]
    fn test_ef_override_at_query_time() {
        let vectors = unit_circle_vectors(64, 8);
        let index = build_index(&vectors);

        // A wider beam may not change the top hit, but it must not break
        // ordering or error.
        let results = index.search(&vectors[5], 5, Some(256), None, None).unwrap();
        assert_eq!(results[0].id, vid(6));
    }
}
