pub mod openai;
#[cfg(feature = "onnx")]
pub mod specter;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Embedding API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("Embedder not configured: {0}")]
    NotConfigured(String),
    #[cfg(feature = "onnx")]
    #[error("Local model error: {0}")]
    Model(String),
}

/// A text embedding provider returning fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

pub const MOCK_DIMENSION: usize = 768;

/// Deterministic pseudo-embedding derived from the text hash.
pub fn mock_embedding(text: &str) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut rng_state = hasher.finish() | 1;
    (0..MOCK_DIMENSION)
        .map(|_| {
            rng_state ^= rng_state << 13;
            rng_state ^= rng_state >> 7;
            rng_state ^= rng_state << 17;
            ((rng_state as f32) / (u64::MAX as f32)) * 2.0 - 1.0
        })
        .collect()
}

/// Offline embedder for tests and runs without an API key.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(mock_embedding(text))
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` for empty, mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-2.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let a = MockEmbedder.embed("holography").await.unwrap();
        let b = MockEmbedder.embed("holography").await.unwrap();
        assert_eq!(a.len(), MOCK_DIMENSION);
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }
}
