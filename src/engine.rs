//! Engine facade — the boundary operations consumed by the serving layer.
//!
//! Ingestion runs Chunker → EmbeddingClient → VectorIndex; answering runs
//! Retriever → AnswerGenerator → ResponseAssembler. The caller constructs
//! and owns the embedding client and the index, and tears them down when
//! the engine is dropped.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::answer::AnswerGenerator;
use crate::chunk::Chunker;
use crate::core::config::EngineConfig;
use crate::core::errors::EngineError;
use crate::embedding::EmbeddingClient;
use crate::index::{ChunkRecord, VectorIndex};
use crate::provider::{ChatMessage, ProviderSelector};
use crate::response::{assemble, AnswerResponse};
use crate::retrieve::Retriever;

#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub owner_id: i64,
    pub document_id: i64,
    pub title: String,
    pub text: String,
    /// URL or filename the document came from.
    pub source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub chunks_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteReceipt {
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub text_excerpt: String,
    pub score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRequest {
    pub owner_id: i64,
    pub question: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

pub struct RagEngine {
    config: EngineConfig,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl RagEngine {
    pub fn new(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let chunker = Chunker::new(config.chunk_window, config.chunk_overlap)?;
        let retriever = Retriever::new(embedder.clone(), index.clone(), config.request_timeout());
        let selector = ProviderSelector::new(&config);
        let generator = AnswerGenerator::new(selector, config.temperature, config.request_timeout());

        Ok(Self {
            config,
            chunker,
            embedder,
            index,
            retriever,
            generator,
        })
    }

    /// Chunk, embed and index one document, replacing any previous version.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, EngineError> {
        if request.title.trim().is_empty() {
            return Err(EngineError::invalid("document title must not be empty"));
        }

        let windows = self.chunker.split(&request.text);
        if windows.is_empty() {
            return Err(EngineError::invalid("document text produced no chunks"));
        }

        let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
        let vectors = tokio::time::timeout(
            self.config.request_timeout(),
            self.embedder.embed(&texts),
        )
        .await
        .map_err(|_| EngineError::Timeout("document embedding"))??;
        if vectors.len() != texts.len() {
            return Err(EngineError::EmbeddingUnavailable(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let items: Vec<(ChunkRecord, Vec<f32>)> = windows
            .into_iter()
            .zip(vectors)
            .map(|(window, vector)| {
                (
                    ChunkRecord {
                        chunk_id: format!("{}_chunk_{}", request.document_id, window.sequence_index),
                        owner_id: request.owner_id,
                        document_id: request.document_id,
                        sequence_index: window.sequence_index as i64,
                        title: request.title.clone(),
                        source: request.source.clone(),
                        text: window.text,
                    },
                    vector,
                )
            })
            .collect();

        let chunks_created = self
            .index
            .replace_document(request.owner_id, request.document_id, items)
            .await?;
        self.index.persist().await?;

        tracing::info!(
            owner_id = request.owner_id,
            document_id = request.document_id,
            chunks = chunks_created,
            "document indexed"
        );
        Ok(IngestReceipt { chunks_created })
    }

    /// Idempotent: deleting a missing document reports `deleted: false`.
    pub async fn delete(
        &self,
        owner_id: i64,
        document_id: i64,
    ) -> Result<DeleteReceipt, EngineError> {
        let deleted = self.index.delete_document(owner_id, document_id).await?;
        self.index.persist().await?;
        Ok(DeleteReceipt { deleted })
    }

    pub async fn search(
        &self,
        owner_id: i64,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let k = k.unwrap_or(self.config.top_k);
        let results = self.retriever.retrieve(owner_id, query, k).await?;
        Ok(results
            .into_iter()
            .map(|r| SearchHit {
                title: r.chunk.title,
                text_excerpt: r.chunk.text,
                score: r.score,
            })
            .collect())
    }

    /// A well-formed answer comes back for every failure mode except bad
    /// input and storage errors: an unreachable embedding backend answers
    /// like an empty retrieval, and provider failures surface through the
    /// response status.
    pub async fn answer(&self, request: AnswerRequest) -> Result<AnswerResponse, EngineError> {
        let k = request.k.unwrap_or(self.config.top_k);
        if k == 0 {
            return Err(EngineError::invalid("k must be at least 1"));
        }
        if request.question.trim().is_empty() {
            return Err(EngineError::invalid("question must not be empty"));
        }

        let passages = match self
            .retriever
            .retrieve(request.owner_id, &request.question, k)
            .await
        {
            Ok(passages) => passages,
            Err(err @ EngineError::Storage(_)) => return Err(err),
            Err(err @ (EngineError::InvalidInput(_) | EngineError::DimensionMismatch { .. })) => {
                return Err(err)
            }
            Err(err) => {
                tracing::warn!(error = %err, "retrieval degraded, answering without context");
                Vec::new()
            }
        };

        let generated = self
            .generator
            .generate(&request.question, &passages, &request.history)
            .await;
        Ok(assemble(generated))
    }

    /// Indexed chunk count, optionally per owner.
    pub async fn chunk_count(&self, owner_id: Option<i64>) -> Result<usize, EngineError> {
        self.index.count(owner_id).await
    }
}
