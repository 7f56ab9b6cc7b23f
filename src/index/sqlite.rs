//! SQLite-backed vector index.
//!
//! In-process store using SQLite for chunk metadata and brute-force cosine
//! similarity for search. Writers are serialized per document; readers run
//! on WAL snapshots and never block behind a writer.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{ChunkRecord, ScoredChunk, SearchFilter, VectorIndex};
use crate::core::errors::EngineError;

/// Scores closer than this are considered ties and fall through to the
/// deterministic sequence/id ordering.
const SCORE_EPSILON: f32 = 1e-6;

const DIM_KEY: &str = "embedding_dim";

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
    // One write lock per document; entries live for the index lifetime.
    doc_locks: Mutex<HashMap<(i64, i64), Arc<Mutex<()>>>>,
}

impl SqliteVectorIndex {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(EngineError::storage)?;

        let index = Self {
            pool,
            db_path,
            doc_locks: Mutex::new(HashMap::new()),
        };
        index.init_schema().await?;
        Ok(index)
    }

    async fn init_schema(&self) -> Result<(), EngineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                owner_id INTEGER NOT NULL,
                document_id INTEGER NOT NULL,
                sequence_index INTEGER NOT NULL,
                title TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_owner_document
             ON chunks(owner_id, document_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(())
    }

    async fn document_lock(&self, owner_id: i64, document_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.doc_locks.lock().await;
            locks
                .entry((owner_id, document_id))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Fixed vector dimension of the index, set by the first insert.
    async fn dimension(&self) -> Result<Option<usize>, EngineError> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
                .bind(DIM_KEY)
                .fetch_optional(&self.pool)
                .await
                .map_err(EngineError::storage)?;

        match raw {
            None => Ok(None),
            Some(value) => value
                .parse::<usize>()
                .map(Some)
                .map_err(|_| EngineError::Storage(format!("corrupt {DIM_KEY} value '{value}'"))),
        }
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> ChunkRecord {
        ChunkRecord {
            chunk_id: row.get("chunk_id"),
            owner_id: row.get("owner_id"),
            document_id: row.get("document_id"),
            sequence_index: row.get("sequence_index"),
            title: row.get("title"),
            source: row.get("source"),
            text: row.get("content"),
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn replace_document(
        &self,
        owner_id: i64,
        document_id: i64,
        items: Vec<(ChunkRecord, Vec<f32>)>,
    ) -> Result<usize, EngineError> {
        for (chunk, embedding) in &items {
            if chunk.owner_id != owner_id || chunk.document_id != document_id {
                return Err(EngineError::invalid(format!(
                    "chunk {} does not belong to document {}/{}",
                    chunk.chunk_id, owner_id, document_id
                )));
            }
            if embedding.is_empty() {
                return Err(EngineError::invalid(format!(
                    "chunk {} has an empty embedding",
                    chunk.chunk_id
                )));
            }
        }

        let _guard = self.document_lock(owner_id, document_id).await;

        let mut tx = self.pool.begin().await.map_err(EngineError::storage)?;

        let raw_dim: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
                .bind(DIM_KEY)
                .fetch_optional(&mut *tx)
                .await
                .map_err(EngineError::storage)?;
        let mut dim: Option<usize> = match raw_dim {
            None => None,
            Some(value) => Some(value.parse::<usize>().map_err(|_| {
                EngineError::Storage(format!("corrupt {DIM_KEY} value '{value}'"))
            })?),
        };

        for (_, embedding) in &items {
            match dim {
                Some(expected) if embedding.len() != expected => {
                    return Err(EngineError::DimensionMismatch {
                        expected,
                        got: embedding.len(),
                    });
                }
                None => {
                    dim = Some(embedding.len());
                    sqlx::query(
                        "INSERT OR REPLACE INTO index_meta (key, value, updated_at)
                         VALUES (?1, ?2, STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))",
                    )
                    .bind(DIM_KEY)
                    .bind(embedding.len().to_string())
                    .execute(&mut *tx)
                    .await
                    .map_err(EngineError::storage)?;
                }
                _ => {}
            }
        }

        sqlx::query("DELETE FROM chunks WHERE owner_id = ?1 AND document_id = ?2")
            .bind(owner_id)
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(EngineError::storage)?;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);
            sqlx::query(
                "INSERT INTO chunks
                     (chunk_id, owner_id, document_id, sequence_index, title, source, content, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(&chunk.chunk_id)
            .bind(chunk.owner_id)
            .bind(chunk.document_id)
            .bind(chunk.sequence_index)
            .bind(&chunk.title)
            .bind(&chunk.source)
            .bind(&chunk.text)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(EngineError::storage)?;
        }

        tx.commit().await.map_err(EngineError::storage)?;
        Ok(items.len())
    }

    async fn delete_document(
        &self,
        owner_id: i64,
        document_id: i64,
    ) -> Result<bool, EngineError> {
        let _guard = self.document_lock(owner_id, document_id).await;

        let result = sqlx::query("DELETE FROM chunks WHERE owner_id = ?1 AND document_id = ?2")
            .bind(owner_id)
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(EngineError::storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(
        &self,
        owner_id: i64,
        query: &[f32],
        k: usize,
        filter: SearchFilter,
    ) -> Result<Vec<ScoredChunk>, EngineError> {
        match self.dimension().await? {
            // Nothing has ever been inserted.
            None => return Ok(Vec::new()),
            Some(expected) if query.len() != expected => {
                return Err(EngineError::DimensionMismatch {
                    expected,
                    got: query.len(),
                });
            }
            _ => {}
        }

        let rows = if let Some(document_id) = filter.document_id {
            sqlx::query(
                "SELECT chunk_id, owner_id, document_id, sequence_index, title, source, content, embedding
                 FROM chunks
                 WHERE owner_id = ?1 AND document_id = ?2",
            )
            .bind(owner_id)
            .bind(document_id)
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        } else {
            sqlx::query(
                "SELECT chunk_id, owner_id, document_id, sequence_index, title, source, content, embedding
                 FROM chunks
                 WHERE owner_id = ?1",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        };

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let embedding_bytes: Vec<u8> = row.get("embedding");
                let stored = Self::deserialize_embedding(&embedding_bytes);
                ScoredChunk {
                    chunk: Self::row_to_chunk(row),
                    score: Self::cosine_similarity(query, &stored),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            if (a.score - b.score).abs() <= SCORE_EPSILON {
                a.chunk
                    .sequence_index
                    .cmp(&b.chunk.sequence_index)
                    .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
            } else {
                b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
            }
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn count(&self, owner_id: Option<i64>) -> Result<usize, EngineError> {
        let count: i64 = if let Some(owner_id) = owner_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE owner_id = ?1")
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await
                .map_err(EngineError::storage)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
                .fetch_one(&self.pool)
                .await
                .map_err(EngineError::storage)?
        };

        Ok(count as usize)
    }

    async fn persist(&self) -> Result<(), EngineError> {
        // The connection guard is released on every exit path.
        let mut conn = self.pool.acquire().await.map_err(EngineError::storage)?;
        sqlx::query("PRAGMA wal_checkpoint(FULL)")
            .execute(&mut *conn)
            .await
            .map_err(EngineError::storage)?;
        Ok(())
    }
}
