//! Persistence sidecar for on-disk indexes.
//!
//! A persisted index is a directory holding the serialized index body
//! (`vector.index`) plus a small JSON descriptor (`index.meta`). The
//! descriptor is always read first: if it is missing or unparsable the
//! index is unloadable, and a dimension or space mismatch with the
//! caller's expectation is a load-time error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IndexError, IndexResult};
use crate::index::DistanceSpace;
use crate::types::VectorDimension;

/// File name of the serialized index body inside a persist directory.
pub const INDEX_BODY_FILE: &str = "vector.index";

/// File name of the JSON descriptor sidecar inside a persist directory.
pub const INDEX_META_FILE: &str = "index.meta";

/// Metadata sidecar written alongside every persisted index body.
///
/// The graph-construction parameters are only present for approximate
/// indexes; a brute-force index persists the first three fields alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub dimension: usize,
    pub capacity: usize,
    pub space: DistanceSpace,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef: Option<usize>,
}

impl IndexDescriptor {
    /// Descriptor for a brute-force index.
    #[must_use]
    pub fn exact(dimension: VectorDimension, capacity: usize, space: DistanceSpace) -> Self {
        Self {
            dimension: dimension.get(),
            capacity,
            space,
            m: None,
            ef_construction: None,
            ef: None,
        }
    }

    /// Descriptor for an approximate index with its graph parameters.
    #[must_use]
    pub fn approximate(
        dimension: VectorDimension,
        capacity: usize,
        space: DistanceSpace,
        m: usize,
        ef_construction: usize,
        ef: usize,
    ) -> Self {
        Self {
            dimension: dimension.get(),
            capacity,
            space,
            m: Some(m),
            ef_construction: Some(ef_construction),
            ef: Some(ef),
        }
    }

    /// Write the sidecar into `directory`, creating it if needed.
    pub fn save(&self, directory: &Path) -> IndexResult<()> {
        std::fs::create_dir_all(directory)?;
        let path = directory.join(INDEX_META_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| IndexError::Persist {
            path: path.clone(),
            source: Box::new(e),
        })?;
        std::fs::write(&path, json)?;
        Ok(())
    }

    /// Read the sidecar from `directory`.
    ///
    /// A missing or unparsable sidecar makes the whole index unloadable.
    pub fn load(directory: &Path) -> IndexResult<Self> {
        let path = directory.join(INDEX_META_FILE);
        let json = std::fs::read_to_string(&path).map_err(|e| IndexError::Load {
            path: path.clone(),
            reason: format!("missing descriptor sidecar: {e}"),
        })?;
        serde_json::from_str(&json).map_err(|e| IndexError::Load {
            path,
            reason: format!("unparsable descriptor sidecar: {e}"),
        })
    }

    /// Fail fast when the descriptor does not match what the caller expects.
    pub fn expect_compatible(
        &self,
        dimension: VectorDimension,
        space: DistanceSpace,
    ) -> IndexResult<()> {
        if self.dimension != dimension.get() {
            return Err(IndexError::DimensionMismatch {
                expected: dimension.get(),
                actual: self.dimension,
            });
        }
        if self.space != space {
            return Err(IndexError::SpaceMismatch {
                stored: self.space.to_string(),
                requested: space.to_string(),
            });
        }
        Ok(())
    }

    /// Path of the index body next to this descriptor.
    #[must_use]
    pub fn body_path(directory: &Path) -> PathBuf {
        directory.join(INDEX_BODY_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_descriptor_roundtrip() {
        let dir = TempDir::new().unwrap();
        let dim = VectorDimension::new(384).unwrap();
        let descriptor =
            IndexDescriptor::approximate(dim, 13_000, DistanceSpace::Cosine, 64, 128, 50);

        descriptor.save(dir.path()).unwrap();
        let loaded = IndexDescriptor::load(dir.path()).unwrap();

        assert_eq!(loaded, descriptor);
        assert_eq!(loaded.m, Some(64));
        assert_eq!(loaded.ef_construction, Some(128));
    }

    #[test]
    fn test_exact_descriptor_omits_graph_params() {
        let dir = TempDir::new().unwrap();
        let dim = VectorDimension::new(8).unwrap();
        let descriptor = IndexDescriptor::exact(dim, 100, DistanceSpace::L2);
        descriptor.save(dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(INDEX_META_FILE)).unwrap();
        assert!(!raw.contains("ef_construction"));

        let loaded = IndexDescriptor::load(dir.path()).unwrap();
        assert_eq!(loaded.m, None);
    }

    #[test]
    fn test_missing_sidecar_is_load_error() {
        let dir = TempDir::new().unwrap();
        let result = IndexDescriptor::load(dir.path());
        assert!(matches!(result, Err(IndexError::Load { .. })));
    }

    #[test]
    fn test_dimension_mismatch_fails_fast() {
        let dim = VectorDimension::new(384).unwrap();
        let descriptor = IndexDescriptor::exact(dim, 10, DistanceSpace::L2);

        let other = VectorDimension::new(768).unwrap();
        assert!(matches!(
            descriptor.expect_compatible(other, DistanceSpace::L2),
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            descriptor.expect_compatible(dim, DistanceSpace::Cosine),
            Err(IndexError::SpaceMismatch { .. })
        ));
        assert!(descriptor.expect_compatible(dim, DistanceSpace::L2).is_ok());
    }
}
