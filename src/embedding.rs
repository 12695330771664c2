//! Embedding generation for vector records.
//!
//! Provides the trait and implementations for converting text into
//! fixed-dimension float vectors. The real implementation uses fastembed;
//! generators are memoized per model name so a process never initializes
//! the same model twice.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::info;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::types::VectorDimension;

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe and should handle batches
/// efficiently. Failures propagate uncaught: retry policy belongs to the
/// caller or an external task queue.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input.
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Generate a single embedding.
    fn embed(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let mut batch = self.embed_batch(&[text])?;
        batch
            .pop()
            .ok_or_else(|| EmbeddingError::Embedding("empty batch result".to_string()))
    }

    /// Dimension of vectors produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// Resolve a configured model name to a fastembed model and its dimension.
///
/// Accepts both the upstream spelling and the fastembed enum name.
pub fn parse_embedding_model(name: &str) -> EmbeddingResult<(EmbeddingModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" | "AllMiniLML6V2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" | "BGESmallENV15" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" | "BGEBaseENV15" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" | "NomicEmbedTextV15" => {
            Ok((EmbeddingModel::NomicEmbedTextV15, 768))
        }
        other => Err(EmbeddingError::UnknownModel(other.to_string())),
    }
}

/// FastEmbed-backed generator.
///
/// The first construction of a given model downloads its weights into the
/// cache directory; subsequent constructions load from cache.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Initialize a generator for the named model.
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or the weights fail
    /// to initialize or download.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> EmbeddingResult<Self> {
        let (model, dim) = parse_embedding_model(model_name)?;

        info!(model = model_name, "loading embedding model (downloads weights on first use)");
        let text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir)
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(text_model),
            dimension: VectorDimension::new(dim)
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // fastembed expects Vec<String> for the embed method
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                EmbeddingError::Embedding(
                    "failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Embedding(e.to_string()))?;

        for embedding in &embeddings {
            if embedding.len() != self.dimension.get() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension.get(),
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Per-model-name memoization of generators.
///
/// An explicit context object rather than an implicit global: the
/// application constructs one and hands it to whoever needs generators.
#[derive(Default)]
pub struct EmbeddingRegistry {
    cache_dir: PathBuf,
    generators: DashMap<String, Arc<FastEmbedGenerator>>,
}

impl EmbeddingRegistry {
    /// Registry whose generators cache model weights under `cache_dir`.
    #[must_use]
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            generators: DashMap::new(),
        }
    }

    /// Returns the memoized generator for `model_name`, initializing it
    /// on first use.
    pub fn get_or_init(&self, model_name: &str) -> EmbeddingResult<Arc<FastEmbedGenerator>> {
        if let Some(existing) = self.generators.get(model_name) {
            return Ok(existing.clone());
        }
        let generator = Arc::new(FastEmbedGenerator::new(model_name, self.cache_dir.clone())?);
        self.generators
            .insert(model_name.to_string(), generator.clone());
        Ok(generator)
    }

    /// Number of initialized models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }
}

/// Mock embedding generator for testing.
///
/// Produces deterministic, normalized vectors derived from the text
/// content, so identical texts always embed identically and no test
/// downloads a model.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dimension).expect("test dimension is non-zero"),
        }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let dim = self.dimension.get();
        let mut embeddings = Vec::with_capacity(texts.len());

        for text in texts {
            let mut embedding = vec![0.1; dim];
            for (i, byte) in text.bytes().enumerate() {
                embedding[i % dim] += f32::from(byte) / 255.0;
            }
            let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            if magnitude > 0.0 {
                for value in &mut embedding {
                    *value /= magnitude;
                }
            }
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embedding_model() {
        assert!(parse_embedding_model("all-MiniLM-L6-v2").is_ok());
        let (_, dim) = parse_embedding_model("AllMiniLML6V2").unwrap();
        assert_eq!(dim, 384);

        let (_, dim) = parse_embedding_model("nomic-embed-text-v1.5").unwrap();
        assert_eq!(dim, 768);

        assert!(matches!(
            parse_embedding_model("word2vec"),
            Err(EmbeddingError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_mock_embeddings_are_deterministic() {
        let generator = MockEmbeddingGenerator::new(16);

        let a = generator.embed("the same text").unwrap();
        let b = generator.embed("the same text").unwrap();
        assert_eq!(a, b);

        let c = generator.embed("a different text").unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_mock_embeddings_are_normalized() {
        let generator = MockEmbeddingGenerator::new(32);
        let embedding = generator.embed("normalize me").unwrap();

        assert_eq!(embedding.len(), 32);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_batch() {
        let generator = MockEmbeddingGenerator::new(8);
        let embeddings = generator.embed_batch(&[]).unwrap();
        assert!(embeddings.is_empty());
    }
}
