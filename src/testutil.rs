//! Test support: deterministic embedding stubs.

use async_trait::async_trait;

use crate::core::errors::EngineError;
use crate::embedding::EmbeddingClient;

/// Deterministic embedder scoring lexical overlap: every lowercased token
/// is hashed into a fixed bucket, so texts sharing words share vector mass
/// and cosine similarity tracks word overlap.
pub(crate) struct LexicalEmbedder {
    pub dim: usize,
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self { dim: 32 }
    }
}

fn bucket(token: &str, dim: usize) -> usize {
    // FNV-1a, reduced modulo the vector dimension.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % dim as u64) as usize
}

#[async_trait]
impl EmbeddingClient for LexicalEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; self.dim];
                for token in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    vector[bucket(token, self.dim)] += 1.0;
                }
                vector
            })
            .collect())
    }
}

/// Always-failing embedder; exercises the degraded answer path.
pub(crate) struct UnavailableEmbedder;

#[async_trait]
impl EmbeddingClient for UnavailableEmbedder {
    async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Err(EngineError::EmbeddingUnavailable(
            "embedding backend offline".to_string(),
        ))
    }
}
