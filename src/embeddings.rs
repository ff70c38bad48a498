//! Embedding capability: text to fixed-dimension vector.
//!
//! Supports:
//! - OpenAI-compatible embedding APIs (OpenRouter/OpenAI)
//! - Deterministic hash-based fallback (free, offline, lower quality)
//!
//! Results are deterministic within a run: identical text always maps to
//! the same vector, via the LRU cache for the API path and by
//! construction for the hash path.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::SynthesisError;

/// Available embedding backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible embeddings endpoint
    Api,
    /// Local hash-based fallback (no network, no model download)
    Hash,
}

/// Embedding model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model_name: String,
    /// API key for the API backend
    pub api_key: Option<String>,
    /// Endpoint base URL for the API backend
    pub base_url: String,
    /// Maximum sequence length in tokens (rough 4 chars/token estimate)
    pub max_length: usize,
    /// Embedding dimension
    pub embedding_dim: usize,
    /// Batch size for API calls
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self::hash()
    }
}

impl EmbeddingConfig {
    /// Config for an OpenAI-compatible embeddings API
    pub fn api(api_key: String, model_name: String) -> Self {
        Self {
            provider: EmbeddingProvider::Api,
            model_name,
            api_key: Some(api_key),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            max_length: 8191,
            embedding_dim: 1536,
            batch_size: 100,
        }
    }

    /// Config for the hash-based fallback (384-dim, MiniLM-shaped)
    pub fn hash() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            model_name: "hash-based".to_string(),
            api_key: None,
            base_url: String::new(),
            max_length: 512,
            embedding_dim: 384,
            batch_size: 100,
        }
    }
}

/// Embedding model wrapper supporting multiple backends
pub struct EmbeddingModel {
    config: EmbeddingConfig,
    client: Client,
    /// Cache for recently computed embeddings
    cache: Arc<RwLock<lru::LruCache<String, Vec<f32>>>>,
}

impl EmbeddingModel {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        info!(
            "Initializing embedding model: {} ({:?})",
            config.model_name, config.provider
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build embedding HTTP client")?;

        let cache = Arc::new(RwLock::new(lru::LruCache::new(
            NonZeroUsize::new(1000).expect("cache size is non-zero"),
        )));

        Ok(Self {
            config,
            client,
            cache,
        })
    }

    /// Generate an embedding for the given text
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, SynthesisError> {
        {
            let mut cache = self.cache.write().await;
            if let Some(cached) = cache.get(text) {
                return Ok(cached.clone());
            }
        }

        let embedding = match self.config.provider {
            EmbeddingProvider::Api => self
                .embed_via_api(&[text.to_string()])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    SynthesisError::CapabilityUnavailable(
                        "embedding API returned no data".to_string(),
                    )
                })?,
            EmbeddingProvider::Hash => self.embed_hash(text),
        };

        let mut cache = self.cache.write().await;
        cache.put(text.to_string(), embedding.clone());
        Ok(embedding)
    }

    /// Generate embeddings for multiple texts, preserving input order.
    ///
    /// Batching is an efficiency measure only; outputs are identical to
    /// calling `embed` once per text.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SynthesisError> {
        match self.config.provider {
            EmbeddingProvider::Hash => Ok(texts.iter().map(|t| self.embed_hash(t)).collect()),
            EmbeddingProvider::Api => {
                let mut results = Vec::with_capacity(texts.len());
                for chunk in texts.chunks(self.config.batch_size) {
                    let batch = self.embed_via_api(chunk).await?;
                    results.extend(batch);
                }
                Ok(results)
            }
        }
    }

    /// Embed one chunk through the API endpoint
    async fn embed_via_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, SynthesisError> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            SynthesisError::CapabilityUnavailable("embedding API key not configured".to_string())
        })?;

        let truncated: Vec<String> = texts.iter().map(|t| self.truncate_text(t)).collect();
        let request = EmbeddingRequest {
            model: self.config.model_name.clone(),
            input: truncated,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SynthesisError::Timeout(Duration::from_secs(30))
                } else {
                    SynthesisError::CapabilityUnavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Embedding API error: {}", error_text);
            return Err(SynthesisError::CapabilityUnavailable(error_text));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::CapabilityUnavailable(e.to_string()))?;

        align_response(texts.len(), result.data)
    }

    /// Hash-based embedding (deterministic, no model needed)
    fn embed_hash(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let dim = self.config.embedding_dim;
        let mut embedding = vec![0.0f32; dim];

        let tokens: Vec<&str> = text.split_whitespace().collect();
        for (i, token) in tokens.iter().enumerate() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            token.to_lowercase().hash(&mut hasher);
            (i as u64).hash(&mut hasher);
            let hash = hasher.finish();

            for (j, slot) in embedding.iter_mut().enumerate() {
                let mut hasher = DefaultHasher::new();
                hash.hash(&mut hasher);
                (j as u64).hash(&mut hasher);
                let val = hasher.finish();
                let normalized = (val as f64 / u64::MAX as f64) * 2.0 - 1.0;
                *slot += normalized as f32;
            }
        }

        let mag: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag > 0.0 {
            for val in embedding.iter_mut() {
                *val /= mag;
            }
        }

        embedding
    }

    /// Truncate text to the configured maximum length
    fn truncate_text(&self, text: &str) -> String {
        let max_chars = self.config.max_length * 4;
        if text.len() > max_chars {
            let mut end = max_chars;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text[..end].to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dimension(&self) -> usize {
        self.config.embedding_dim
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }
}

/// Restore input order and verify the response covers every input.
/// A short or empty response is a provider fault, not a panic.
fn align_response(
    expected: usize,
    mut data: Vec<EmbeddingData>,
) -> Result<Vec<Vec<f32>>, SynthesisError> {
    if data.len() != expected {
        return Err(SynthesisError::CapabilityUnavailable(format!(
            "embedding API returned {} embeddings for {} inputs",
            data.len(),
            expected
        )));
    }

    // Sort by index to maintain input order
    data.sort_by_key(|d| d.index);
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: i32,
}
