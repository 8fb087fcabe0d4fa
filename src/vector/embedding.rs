//! Embedding provider contract.
//!
//! The index never produces embeddings itself. It talks to an
//! [`EmbeddingGenerator`], which is either a fastembed model or the
//! deterministic hash-based generator used for tests and as the fallback when
//! the real model fails or times out.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};

use crate::vector::similarity::normalize_vector;
use crate::vector::types::{VectorDimension, VectorError};

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe; calls may arrive from blocking tasks.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one per input.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;
}

/// fastembed-backed generator.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedGenerator {
    /// Loads `model`, downloading it into `cache_dir` on first use.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn new(model: EmbeddingModel, cache_dir: &Path) -> Result<Self, VectorError> {
        let dimension = VectorDimension::new(model_dimension(&model))?;
        let text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| {
            VectorError::EmbeddingFailed(format!(
                "Failed to initialize embedding model: {e}. Ensure you have internet connection for first-time model download"
            ))
        })?;

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(text_strings, None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Deterministic generator that hashes text into a unit vector.
///
/// Identical text always yields an identical embedding. There is no semantic
/// signal beyond that, which is enough for tests and for keeping the index
/// usable when the real provider is down.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbeddingGenerator {
    dimension: VectorDimension,
}

impl Default for HashEmbeddingGenerator {
    fn default() -> Self {
        Self::new(VectorDimension::dimension_384())
    }
}

impl HashEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }
}

impl EmbeddingGenerator for HashEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| placeholder_embedding(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

/// Derives a deterministic unit-length embedding from the SHA-256 of `text`.
///
/// The digest is chained (`h_{i+1} = sha256(h_i)`) until enough bytes exist;
/// each byte maps to `[-1, 1]`.
#[must_use]
pub fn placeholder_embedding(text: &str, dimension: VectorDimension) -> Vec<f32> {
    let dim = dimension.get();
    let mut embedding = Vec::with_capacity(dim);
    let mut digest = Sha256::digest(text.as_bytes());

    while embedding.len() < dim {
        for &byte in digest.iter() {
            if embedding.len() == dim {
                break;
            }
            embedding.push(f32::from(byte) / 127.5 - 1.0);
        }
        digest = Sha256::digest(digest);
    }

    normalize_vector(&mut embedding);
    embedding
}

/// Outcome of a guarded embedding call.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedEmbedding {
    pub embedding: Vec<f32>,
    /// True when the provider failed or timed out and a placeholder was used.
    pub placeholder: bool,
}

/// Embeds one text with a timeout, falling back to [`placeholder_embedding`].
///
/// Always yields a vector: the index cannot operate without one.
pub async fn embed_with_fallback(
    generator: Arc<dyn EmbeddingGenerator>,
    text: &str,
    timeout: Duration,
) -> GuardedEmbedding {
    let dimension = generator.dimension();
    let owned = text.to_string();
    let task = tokio::task::spawn_blocking(move || {
        generator
            .generate_embeddings(&[owned.as_str()])
            .and_then(|mut batch| {
                batch
                    .pop()
                    .ok_or_else(|| VectorError::EmbeddingFailed("empty batch".to_string()))
            })
    });

    let reason = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(embedding))) => {
            return GuardedEmbedding {
                embedding,
                placeholder: false,
            };
        }
        Ok(Ok(Err(e))) => e.to_string(),
        Ok(Err(join)) => format!("embedding task panicked: {join}"),
        Err(_) => format!("timed out after {}ms", timeout.as_millis()),
    };

    tracing::warn!("[embedding] provider unavailable ({reason}); using placeholder embedding");
    GuardedEmbedding {
        embedding: placeholder_embedding(text, dimension),
        placeholder: true,
    }
}

/// Parses a model name as written in settings.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" => Ok(EmbeddingModel::BGEBaseENV15),
        "MultilingualE5Small" => Ok(EmbeddingModel::MultilingualE5Small),
        "NomicEmbedTextV15" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, MultilingualE5Small, NomicEmbedTextV15"
        ))),
    }
}

/// Output length of the supported models.
fn model_dimension(model: &EmbeddingModel) -> usize {
    match model {
        EmbeddingModel::BGEBaseENV15 | EmbeddingModel::NomicEmbedTextV15 => 768,
        _ => 384,
    }
}
