//! Vector index boundary — persistent (vector, text, metadata) storage with
//! owner-scoped nearest-neighbor search.

pub mod sqlite;

pub use sqlite::SqliteVectorIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

/// A stored chunk with its metadata. The embedding travels separately so
/// search results do not drag vectors around.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Stable id, unique across the index (`"{document_id}_chunk_{seq}"`).
    pub chunk_id: String,
    pub owner_id: i64,
    pub document_id: i64,
    pub sequence_index: i64,
    /// Document title, surfaced as the answer source.
    pub title: String,
    /// Source locator (URL or filename).
    pub source: String,
    pub text: String,
}

/// Result of a similarity search, descending cosine score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f32,
}

/// Optional narrowing of a search beyond the mandatory owner scope.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchFilter {
    pub document_id: Option<i64>,
}

/// Abstract index contract. The shipped implementation is a brute-force
/// SQLite store; an approximate index may be substituted behind this trait
/// as long as the ordering contract holds.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Replace every chunk of the document with `items`, atomically: after
    /// a crash either all of the batch is queryable or the previous state
    /// is intact.
    async fn replace_document(
        &self,
        owner_id: i64,
        document_id: i64,
        items: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<usize, EngineError>;

    /// Remove every chunk of the document. Idempotent; returns `false`
    /// when nothing matched.
    async fn delete_document(&self, owner_id: i64, document_id: i64)
        -> Result<bool, EngineError>;

    /// Up to `k` results restricted to `owner_id`. Never returns another
    /// owner's chunks.
    async fn search(
        &self,
        owner_id: i64,
        query: &[f32],
        k: usize,
        filter: SearchFilter,
    ) -> Result<Vec<ScoredChunk>, EngineError>;

    /// Chunk count, optionally restricted to one owner.
    async fn count(&self, owner_id: Option<i64>) -> Result<usize, EngineError>;

    /// Flush pending writes to durable storage.
    async fn persist(&self) -> Result<(), EngineError>;
}
