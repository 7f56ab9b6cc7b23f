//! Embedding capability boundary.

pub mod http;

pub use http::RemoteEmbedder;

use async_trait::async_trait;

use crate::core::errors::EngineError;

/// Maps text spans to fixed-dimension vectors.
///
/// The embedding model itself lives behind this trait; the engine only
/// requires that one input produces one vector and that every vector a
/// client emits has the same dimension.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;
}
