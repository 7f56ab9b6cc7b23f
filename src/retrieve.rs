//! Query-time retrieval: embed the question, search the index.

use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::EngineError;
use crate::embedding::EmbeddingClient;
use crate::index::{ScoredChunk, SearchFilter, VectorIndex};

pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            timeout,
        }
    }

    /// Read-only. Results come back exactly as the index orders them; an
    /// embedding failure surfaces instead of being swallowed.
    pub async fn retrieve(
        &self,
        owner_id: i64,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, EngineError> {
        self.retrieve_filtered(owner_id, query, k, SearchFilter::default())
            .await
    }

    pub async fn retrieve_filtered(
        &self,
        owner_id: i64,
        query: &str,
        k: usize,
        filter: SearchFilter,
    ) -> Result<Vec<ScoredChunk>, EngineError> {
        if k == 0 {
            return Err(EngineError::invalid("k must be at least 1"));
        }
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::invalid("query must not be empty"));
        }

        let inputs = vec![query.to_string()];
        let vectors = tokio::time::timeout(self.timeout, self.embedder.embed(&inputs))
            .await
            .map_err(|_| EngineError::Timeout("query embedding"))??;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            EngineError::EmbeddingUnavailable("embedding client returned no vector".to_string())
        })?;

        self.index.search(owner_id, &vector, k, filter).await
    }
}
