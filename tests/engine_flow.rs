//! End-to-end flow: ingest, search, answer, delete, restart.

use std::sync::Arc;

use async_trait::async_trait;
use corpusqa::embedding::EmbeddingClient;
use corpusqa::engine::{AnswerRequest, IngestRequest};
use corpusqa::{EngineConfig, EngineError, RagEngine, SqliteVectorIndex};

const PRIMER: &str =
    "A quick primer on graphs. Graphs model relationships. Trees are special graphs.";

/// Deterministic stand-in for a real embedding model: token-bucket counts,
/// so cosine similarity tracks lexical overlap.
struct LexicalEmbedder;

const DIM: usize = 32;

fn bucket(token: &str) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in token.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    (hash % DIM as u64) as usize
}

#[async_trait]
impl EmbeddingClient for LexicalEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        Ok(inputs
            .iter()
            .map(|text| {
                let mut vector = vec![0.0f32; DIM];
                for token in text
                    .to_lowercase()
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    vector[bucket(token)] += 1.0;
                }
                vector
            })
            .collect())
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        chunk_window: 40,
        chunk_overlap: 10,
        ..EngineConfig::default()
    }
}

async fn open_engine(path: std::path::PathBuf) -> anyhow::Result<RagEngine> {
    let index = Arc::new(SqliteVectorIndex::with_path(path).await?);
    Ok(RagEngine::new(test_config(), Arc::new(LexicalEmbedder), index)?)
}

#[tokio::test]
async fn full_lifecycle_across_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("corpus.db");

    {
        let engine = open_engine(db_path.clone()).await?;

        let receipt = engine
            .ingest(IngestRequest {
                owner_id: 1,
                document_id: 7,
                title: "Graph primer".to_string(),
                text: PRIMER.to_string(),
                source: "primer.txt".to_string(),
            })
            .await?;
        assert!(receipt.chunks_created >= 3);

        let hits = engine.search(1, "what is a graph", Some(2)).await?;
        assert!(!hits.is_empty());
        assert!(hits[0].text_excerpt.to_lowercase().contains("graph"));

        let response = engine
            .answer(AnswerRequest {
                owner_id: 1,
                question: "what is a graph".to_string(),
                k: Some(2),
                history: Vec::new(),
            })
            .await?;
        assert!(response.has_context);
        assert_eq!(response.sources, vec!["Graph primer"]);
    }

    // The index is the durable artifact: a fresh engine over the same file
    // still serves the chunks, exactly once each.
    let engine = open_engine(db_path).await?;
    assert_eq!(engine.chunk_count(Some(1)).await?, 3);

    let hits = engine.search(1, "graphs", Some(10)).await?;
    assert!(!hits.is_empty());

    let deleted = engine.delete(1, 7).await?;
    assert!(deleted.deleted);
    let hits = engine.search(1, "graphs", Some(10)).await?;
    assert!(hits.is_empty());

    // Second delete is a no-op, not an error.
    let deleted = engine.delete(1, 7).await?;
    assert!(!deleted.deleted);

    Ok(())
}

#[tokio::test]
async fn reingesting_a_document_does_not_duplicate_chunks() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let engine = open_engine(dir.path().join("corpus.db")).await?;

    let request = IngestRequest {
        owner_id: 1,
        document_id: 7,
        title: "Graph primer".to_string(),
        text: PRIMER.to_string(),
        source: "primer.txt".to_string(),
    };
    let first = engine.ingest(request.clone()).await?;
    let second = engine.ingest(request).await?;

    assert_eq!(first.chunks_created, second.chunks_created);
    assert_eq!(engine.chunk_count(Some(1)).await?, second.chunks_created);
    Ok(())
}
