//! Distance spaces and their scoring kernels.
//!
//! Both indexes score candidates with the same two kernels: squared
//! euclidean distance (`l2`) and cosine distance (`1 - cosine similarity`).
//! Lower is always more similar, so result rows sort ascending.

use serde::{Deserialize, Serialize};

/// Distance space an index was built with.
///
/// Fixed at index creation and persisted in the descriptor sidecar;
/// loading with a different space fails fast instead of silently
/// returning garbage distances.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceSpace {
    /// Squared euclidean distance.
    #[default]
    L2,
    /// Cosine distance (1 - cosine similarity).
    Cosine,
}

impl DistanceSpace {
    /// Stable name used in descriptor files and registry keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::Cosine => "cosine",
        }
    }

    /// Parse a space name as it appears in descriptors and settings.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "l2" => Some(Self::L2),
            "cosine" => Some(Self::Cosine),
            _ => None,
        }
    }

    /// Distance between two equal-length vectors in this space.
    #[inline]
    #[must_use]
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => squared_euclidean(a, b),
            Self::Cosine => cosine_distance(a, b),
        }
    }
}

impl std::fmt::Display for DistanceSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Squared euclidean distance between two vectors.
///
/// The square root is never taken: ordering is identical and the
/// comparison is cheaper.
#[inline]
#[must_use]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
#[inline]
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Cosine distance: `1 - cosine_similarity`.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squared_euclidean() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 2.0, 2.0];
        assert!((squared_euclidean(&a, &b) - 9.0).abs() < 1e-6);
        assert_eq!(squared_euclidean(&a, &a), 0.0);
    }

    #[test]
    fn test_cosine_similarity() {
        // Identical vectors
        let v1 = vec![1.0, 0.0, 0.0];
        let v2 = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v2) - 1.0).abs() < 0.001);

        // Orthogonal vectors
        let v3 = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&v1, &v3) - 0.0).abs() < 0.001);

        // Opposite vectors
        let v4 = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&v1, &v4) - (-1.0)).abs() < 0.001);

        // Zero magnitude
        let zero = vec![0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&v1, &zero), 0.0);
    }

    #[test]
    fn test_cosine_distance_ordering() {
        let query = vec![1.0, 0.0];
        let close = vec![0.9, 0.1];
        let far = vec![-1.0, 0.0];
        assert!(cosine_distance(&query, &close) < cosine_distance(&query, &far));
    }

    #[test]
    fn test_space_parse_roundtrip() {
        for space in [DistanceSpace::L2, DistanceSpace::Cosine] {
            assert_eq!(DistanceSpace::parse(space.as_str()), Some(space));
        }
        assert_eq!(DistanceSpace::parse("manhattan"), None);
    }
}
