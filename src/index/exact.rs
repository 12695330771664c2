//! Brute-force nearest-neighbor index.
//!
//! Holds every vector in memory and scans all of them for each query. No
//! exactness optimization is attempted: below the bruteforce ceiling a
//! full scan is cheap, and building a fresh index over the candidate set
//! guarantees freshness that an incrementally-updated approximate index
//! cannot.
//!
//! # Storage Format
//!
//! The persisted body uses a simple binary format:
//! - Header (16 bytes): magic, version, dimension, vector count
//! - Rows: vector id (u32) followed by the f32 values, all little-endian

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::MmapOptions;
use rayon::prelude::*;

use crate::error::{IndexError, IndexResult};
use crate::index::descriptor::IndexDescriptor;
use crate::index::{DistanceSpace, Neighbor};
use crate::types::{VectorDimension, VectorId};

/// Magic bytes identifying a brute-force index body.
const MAGIC_BYTES: &[u8; 4] = b"VBFI";

/// Current body format version.
const BODY_VERSION: u32 = 1;

/// Size of the body header in bytes.
const HEADER_SIZE: usize = 16;

/// Row count above which query scoring runs on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 2_048;

/// Brute-force full-scan similarity index.
///
/// Vectors are stored contiguously in insertion order; ties in distance
/// are broken by that order (stable sort).
#[derive(Debug)]
pub struct ExactIndex {
    dimension: VectorDimension,
    capacity: usize,
    space: DistanceSpace,
    growth_factor: f64,
    ids: Vec<VectorId>,
    /// Flat row-major storage, `ids.len() * dimension` values.
    values: Vec<f32>,
}

impl ExactIndex {
    /// Creates an empty index for the given dimension and capacity.
    #[must_use]
    pub fn new(dimension: VectorDimension, capacity: usize, space: DistanceSpace) -> Self {
        Self {
            dimension,
            capacity,
            space,
            growth_factor: crate::index::DEFAULT_GROWTH_FACTOR,
            ids: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Overrides the capacity growth multiplier (default 1.2).
    #[must_use]
    pub fn with_growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = factor;
        self
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.ids.len()
    }

    /// Current capacity. Grows by the configured factor when an add
    /// would overflow it.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The dimension this index was created with.
    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// The distance space this index was created with.
    #[must_use]
    pub fn space(&self) -> DistanceSpace {
        self.space
    }

    /// Appends vectors with caller-supplied ids.
    ///
    /// Errors if the batch lengths differ or any vector has the wrong
    /// dimension. Capacity auto-grows instead of rejecting the batch.
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

        if self.ids.len() + ids.len() > self.capacity {
            self.grow(self.ids.len() + ids.len());
        }

        for (id, embedding) in ids.iter().zip(embeddings) {
            self.ids.push(*id);
            self.values.extend_from_slice(embedding);
        }
        Ok(())
    }

    fn grow(&mut self, needed: usize) {
        let grown = (self.capacity as f64 * self.growth_factor).ceil() as usize;
        self.capacity = grown.max(needed);
    }

    /// Row slice for position `pos` in insertion order.
    #[inline]
    fn row(&self, pos: usize) -> &[f32] {
        let dim = self.dimension.get();
        &self.values[pos * dim..(pos + 1) * dim]
    }

    /// Searches the k nearest neighbors for each query row.
    ///
    /// `allow`/`deny` restrict which stored ids are eligible; both may be
    /// combined. Each result row is sorted by ascending distance, ties
    /// keeping insertion order. `k` larger than the eligible count simply
    /// returns every eligible id.
    pub fn search(
        &self,
        queries: &[&[f32]],
        k: usize,
        allow: Option<&HashSet<VectorId>>,
        deny: Option<&HashSet<VectorId>>,
    ) -> IndexResult<Vec<Vec<Neighbor>>> {
        for query in queries {
            self.dimension.validate_vector(query)?;
        }

        queries
            .iter()
            .map(|query| Ok(self.search_row(query, k, allow, deny)))
            .collect()
    }

    /// Single-query convenience over [`ExactIndex::search`].
    pub fn search_one(
        &self,
        query: &[f32],
        k: usize,
        allow: Option<&HashSet<VectorId>>,
        deny: Option<&HashSet<VectorId>>,
    ) -> IndexResult<Vec<Neighbor>> {
        self.dimension.validate_vector(query)?;
        Ok(self.search_row(query, k, allow, deny))
    }

    fn search_row(
        &self,
        query: &[f32],
        k: usize,
        allow: Option<&HashSet<VectorId>>,
        deny: Option<&HashSet<VectorId>>,
    ) -> Vec<Neighbor> {
        let count = self.ids.len();

        let distances: Vec<f32> = if count >= PARALLEL_SCAN_THRESHOLD {
            (0..count)
                .into_par_iter()
                .map(|pos| self.space.distance(query, self.row(pos)))
                .collect()
        } else {
            (0..count)
                .map(|pos| self.space.distance(query, self.row(pos)))
                .collect()
        };

        let mut candidates: Vec<Neighbor> = self
            .ids
            .iter()
            .zip(distances)
            .filter(|(id, _)| {
                allow.is_none_or(|set| set.contains(id)) && deny.is_none_or(|set| !set.contains(id))
            })
            .map(|(id, distance)| Neighbor::new(*id, distance))
            .collect();

        // Stable sort on distance alone keeps insertion order for ties.
        candidates.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        candidates
    }

    /// Writes the index body and its descriptor sidecar into `directory`.
    pub fn persist(&self, directory: &Path) -> IndexResult<()> {
        let descriptor = IndexDescriptor::exact(self.dimension, self.capacity, self.space);
        descriptor.save(directory)?;

        let body_path = IndexDescriptor::body_path(directory);
        let file = File::create(&body_path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC_BYTES)?;
        writer.write_all(&BODY_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension.get() as u32).to_le_bytes())?;
        writer.write_all(&(self.ids.len() as u32).to_le_bytes())?;

        for (pos, id) in self.ids.iter().enumerate() {
            writer.write_all(&id.to_bytes())?;
            for value in self.row(pos) {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Reconstructs an index from `directory`, reading the sidecar first.
    pub fn load(directory: &Path) -> IndexResult<Self> {
        let descriptor = IndexDescriptor::load(directory)?;
        let dimension = VectorDimension::new(descriptor.dimension)?;
        let mut index = Self::new(dimension, descriptor.capacity, descriptor.space);

        let body_path = IndexDescriptor::body_path(directory);
        let file = File::open(&body_path).map_err(|e| IndexError::Load {
            path: body_path.clone(),
            reason: format!("missing index body: {e}"),
        })?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        if mmap.len() < HEADER_SIZE {
            return Err(IndexError::Corrupt {
                reason: "index body shorter than header".to_string(),
            });
        }
        if &mmap[0..4] != MAGIC_BYTES {
            return Err(IndexError::Corrupt {
                reason: "bad magic bytes in index body".to_string(),
            });
        }
        let version = u32::from_le_bytes(mmap[4..8].try_into().expect("slice length checked"));
        if version != BODY_VERSION {
            return Err(IndexError::Corrupt {
                reason: format!("unsupported body version {version}"),
            });
        }
        let dim = u32::from_le_bytes(mmap[8..12].try_into().expect("slice length checked")) as usize;
        if dim != descriptor.dimension {
            return Err(IndexError::Corrupt {
                reason: format!(
                    "body dimension {dim} disagrees with descriptor {}",
                    descriptor.dimension
                ),
            });
        }
        let count =
            u32::from_le_bytes(mmap[12..16].try_into().expect("slice length checked")) as usize;

        let row_bytes = 4 + dim * 4;
        if mmap.len() < HEADER_SIZE + count * row_bytes {
            return Err(IndexError::Corrupt {
                reason: "index body truncated".to_string(),
            });
        }

        for row in 0..count {
            let offset = HEADER_SIZE + row * row_bytes;
            let id_bytes: [u8; 4] = mmap[offset..offset + 4]
                .try_into()
                .expect("slice length checked");
            let id = VectorId::from_bytes(id_bytes).ok_or_else(|| IndexError::Corrupt {
                reason: format!("zero vector id at row {row}"),
            })?;

            let mut embedding = Vec::with_capacity(dim);
            for i in 0..dim {
                let start = offset + 4 + i * 4;
                let value_bytes: [u8; 4] = mmap[start..start + 4]
                    .try_into()
                    .expect("slice length checked");
                embedding.push(f32::from_le_bytes(value_bytes));
            }
            index.ids.push(id);
            index.values.extend_from_slice(&embedding);
        }

        Ok(index)
    }

    /// Like [`ExactIndex::load`], but fails fast when the persisted
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
