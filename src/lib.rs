//! corpusqa — owner-scoped document retrieval and grounded question
//! answering.
//!
//! Documents are chunked into overlapping windows, embedded through a
//! caller-supplied [`embedding::EmbeddingClient`], and indexed in SQLite.
//! Questions are answered from the retrieved passages: through a generative
//! provider when one is configured (explicitly or auto-detected from
//! credentials), and through a deterministic document-grounded fallback
//! when none is. The serving layer sits above this crate and owns the
//! engine's collaborators.

pub mod answer;
pub mod chunk;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod index;
pub mod logging;
pub mod provider;
pub mod response;
pub mod retrieve;

#[cfg(test)]
pub(crate) mod testutil;

pub use crate::core::config::EngineConfig;
pub use crate::core::errors::EngineError;
pub use crate::engine::{
    AnswerRequest, DeleteReceipt, IngestReceipt, IngestRequest, RagEngine, SearchHit,
};
pub use crate::index::SqliteVectorIndex;
pub use crate::response::AnswerResponse;
