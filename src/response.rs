//! External answer contract.
//!
//! Kept separate from `answer` so the generation result and the boundary
//! contract can evolve independently; the serving layer only ever sees
//! `AnswerResponse`.

use serde::Serialize;

use crate::answer::{AnswerStatus, GenerationResponse, ProviderTag};

#[derive(Debug, Clone, Serialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub has_context: bool,
    pub status: AnswerStatus,
    pub provider: ProviderTag,
}

/// Pure wrap: no additional logic.
pub fn assemble(response: GenerationResponse) -> AnswerResponse {
    AnswerResponse {
        answer: response.answer,
        sources: response.sources,
        has_context: response.has_context,
        status: response.status,
        provider: response.provider,
    }
}
