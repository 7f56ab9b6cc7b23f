//! Grounded answer generation.
//!
//! Builds a prompt from the retrieved passages and the question, invokes
//! the resolved provider, and normalizes the outcome. Without a usable
//! provider the answer degrades to a deterministic source-attributed
//! digest of the passages; a provider failure is logged and absorbed into
//! the response status, never propagated raw.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;
use crate::index::ScoredChunk;
use crate::provider::{
    ChatMessage, ChatRequest, GenerativeProvider, ProviderKind, ProviderSelector,
};

pub const NO_CONTEXT_ANSWER: &str =
    "No relevant documents were found for this question. Add documents and try again.";

const SYSTEM_PREAMBLE: &str = "You are a helpful assistant. Use the provided context to answer questions.\nIf the answer is not in the context, say so clearly.";

// Prior turns included in the prompt.
const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Success,
    Fallback,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    OpenAi,
    Perplexity,
    Fallback,
}

impl From<ProviderKind> for ProviderTag {
    fn from(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::OpenAi => ProviderTag::OpenAi,
            ProviderKind::Perplexity => ProviderTag::Perplexity,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub has_context: bool,
    pub status: AnswerStatus,
    pub provider: ProviderTag,
}

pub struct AnswerGenerator {
    selector: ProviderSelector,
    temperature: f32,
    timeout: Duration,
}

impl AnswerGenerator {
    pub fn new(selector: ProviderSelector, temperature: f32, timeout: Duration) -> Self {
        Self {
            selector,
            temperature,
            timeout,
        }
    }

    pub async fn generate(
        &self,
        question: &str,
        passages: &[ScoredChunk],
        history: &[ChatMessage],
    ) -> GenerationResponse {
        if passages.is_empty() {
            return GenerationResponse {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                has_context: false,
                status: AnswerStatus::Fallback,
                provider: ProviderTag::Fallback,
            };
        }

        let sources = source_titles(passages);

        let (kind, provider) = match (self.selector.state().kind(), self.selector.provider()) {
            (Some(kind), Some(provider)) => (kind, provider),
            _ => {
                return GenerationResponse {
                    answer: grounded_digest(passages),
                    sources,
                    has_context: true,
                    status: AnswerStatus::Fallback,
                    provider: ProviderTag::Fallback,
                };
            }
        };

        let request = ChatRequest {
            messages: build_messages(question, passages, history),
            model: self
                .selector
                .model()
                .unwrap_or_else(|| kind.default_model().to_string()),
            temperature: self.temperature,
            max_tokens: kind.max_tokens(),
        };

        match self.invoke(provider.as_ref(), &request).await {
            Ok(answer) => GenerationResponse {
                answer,
                sources,
                has_context: true,
                status: AnswerStatus::Success,
                provider: kind.into(),
            },
            Err(err) => {
                tracing::warn!(
                    provider = kind.as_str(),
                    error = %err,
                    "provider call failed, degrading to grounded fallback"
                );
                let (status, provider_tag) = if err.is_provider_fault() {
                    (AnswerStatus::Error, kind.into())
                } else {
                    (AnswerStatus::Fallback, ProviderTag::Fallback)
                };
                GenerationResponse {
                    answer: grounded_digest(passages),
                    sources,
                    has_context: true,
                    status,
                    provider: provider_tag,
                }
            }
        }
    }

    /// One call, at most one retry on transient failures, all within the
    /// same deadline budget.
    async fn invoke(
        &self,
        provider: &dyn GenerativeProvider,
        request: &ChatRequest,
    ) -> Result<String, EngineError> {
        let deadline = Instant::now() + self.timeout;

        let first = self.call_within(provider, request, deadline).await;
        let retryable = matches!(&first, Err(err) if err.is_transient());
        if retryable && Instant::now() < deadline {
            tracing::warn!(provider = provider.name(), "transient provider failure, retrying once");
            return self.call_within(provider, request, deadline).await;
        }
        first
    }

    async fn call_within(
        &self,
        provider: &dyn GenerativeProvider,
        request: &ChatRequest,
        deadline: Instant,
    ) -> Result<String, EngineError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EngineError::Timeout("provider call"));
        }
        tokio::time::timeout(remaining, provider.complete(request))
            .await
            .map_err(|_| EngineError::Timeout("provider call"))?
    }
}

fn build_messages(
    question: &str,
    passages: &[ScoredChunk],
    history: &[ChatMessage],
) -> Vec<ChatMessage> {
    let context = passages
        .iter()
        .map(|p| format!("Source: {}\n{}", p.chunk.title, p.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let mut messages = vec![ChatMessage::system(format!(
        "{SYSTEM_PREAMBLE}\n\nContext:\n{context}"
    ))];
    let skip = history.len().saturating_sub(HISTORY_WINDOW);
    messages.extend(history[skip..].iter().cloned());
    messages.push(ChatMessage::user(question));
    messages
}

/// Deterministic LLM-free substitute: the top passages with their sources.
fn grounded_digest(passages: &[ScoredChunk]) -> String {
    let mut out = String::from("No generative model answered this question. Most relevant passages:\n");
    for (i, p) in passages.iter().enumerate() {
        out.push_str(&format!("\n[{}] Source: {}\n{}\n", i + 1, p.chunk.title, p.chunk.text));
    }
    out
}

/// Titles in ranked order, first occurrence wins.
fn source_titles(passages: &[ScoredChunk]) -> Vec<String> {
    let mut titles: Vec<String> = Vec::new();
    for p in passages {
        if !titles.contains(&p.chunk.title) {
            titles.push(p.chunk.title.clone());
        }
    }
    titles
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::core::config::EngineConfig;
    use crate::core::errors::ProviderFaultKind;
    use crate::index::ChunkRecord;
    use crate::provider::ProviderState;

    struct CannedProvider {
        reply: &'static str,
    }

    #[async_trait]
    impl GenerativeProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, EngineError> {
            Ok(self.reply.to_string())
        }
    }

    struct FailingProvider {
        kind: ProviderFaultKind,
        calls: AtomicUsize,
    }

    impl FailingProvider {
        fn new(kind: ProviderFaultKind) -> Self {
            Self {
                kind,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerativeProvider for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::provider(self.kind, "stub failure"))
        }
    }

    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<String, EngineError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EngineError::provider(
                    ProviderFaultKind::Transient,
                    "connection reset",
                ))
            } else {
                Ok("recovered".to_string())
            }
        }
    }

    fn passage(title: &str, text: &str, seq: i64) -> ScoredChunk {
        ScoredChunk {
            chunk: ChunkRecord {
                chunk_id: format!("7_chunk_{seq}"),
                owner_id: 1,
                document_id: 7,
                sequence_index: seq,
                title: title.to_string(),
                source: "doc.txt".to_string(),
                text: text.to_string(),
            },
            score: 0.9,
        }
    }

    fn generator_with(provider: Arc<dyn GenerativeProvider>) -> AnswerGenerator {
        let selector = ProviderSelector::preloaded(
            ProviderState::Explicit(ProviderKind::OpenAi),
            provider,
            EngineConfig {
                openai_api_key: Some("sk-test".to_string()),
                ..EngineConfig::default()
            },
        );
        AnswerGenerator::new(selector, 0.7, Duration::from_secs(5))
    }

    fn fallback_generator() -> AnswerGenerator {
        let selector = ProviderSelector::new(&EngineConfig::default());
        AnswerGenerator::new(selector, 0.7, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn empty_passages_always_fall_back_even_with_a_provider() {
        let generator = generator_with(Arc::new(CannedProvider { reply: "unused" }));
        let response = generator.generate("anything?", &[], &[]).await;

        assert!(!response.has_context);
        assert_eq!(response.status, AnswerStatus::Fallback);
        assert_eq!(response.provider, ProviderTag::Fallback);
        assert_eq!(response.answer, NO_CONTEXT_ANSWER);
        assert!(response.sources.is_empty());
    }

    #[tokio::test]
    async fn fallback_resolution_with_passages_returns_grounded_digest() {
        let generator = fallback_generator();
        let passages = vec![
            passage("Graph primer", "Graphs model relationships.", 0),
            passage("Graph primer", "Trees are special graphs.", 1),
            passage("Networks", "Networks carry packets.", 0),
        ];
        let response = generator.generate("what is a graph", &passages, &[]).await;

        assert!(response.has_context);
        assert_eq!(response.status, AnswerStatus::Fallback);
        assert_eq!(response.provider, ProviderTag::Fallback);
        assert!(response.answer.contains("Graphs model relationships."));
        assert!(response.answer.contains("Source: Graph primer"));
        assert_eq!(response.sources, vec!["Graph primer", "Networks"]);
    }

    #[tokio::test]
    async fn provider_success_is_reported_with_its_tag() {
        let generator = generator_with(Arc::new(CannedProvider { reply: "a graph is a set of nodes" }));
        let passages = vec![passage("Graph primer", "Graphs model relationships.", 0)];
        let response = generator.generate("what is a graph", &passages, &[]).await;

        assert_eq!(response.status, AnswerStatus::Success);
        assert_eq!(response.provider, ProviderTag::OpenAi);
        assert_eq!(response.answer, "a graph is a set of nodes");
        assert_eq!(response.sources, vec!["Graph primer"]);
    }

    #[tokio::test]
    async fn auth_failure_degrades_with_error_status() {
        let provider = Arc::new(FailingProvider::new(ProviderFaultKind::Auth));
        let generator = generator_with(provider.clone());
        let passages = vec![passage("Graph primer", "Graphs model relationships.", 0)];
        let response = generator.generate("what is a graph", &passages, &[]).await;

        assert_eq!(response.status, AnswerStatus::Error);
        assert_eq!(response.provider, ProviderTag::OpenAi);
        assert!(response.has_context);
        assert!(response.answer.contains("Graphs model relationships."));
        assert_eq!(response.sources, vec!["Graph primer"]);
        // Auth errors are never retried.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once_and_can_recover() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
        });
        let generator = generator_with(provider.clone());
        let passages = vec![passage("Graph primer", "Graphs model relationships.", 0)];
        let response = generator.generate("what is a graph", &passages, &[]).await;

        assert_eq!(response.status, AnswerStatus::Success);
        assert_eq!(response.answer, "recovered");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn persistent_transient_failure_degrades_to_fallback_after_one_retry() {
        let provider = Arc::new(FailingProvider::new(ProviderFaultKind::Transient));
        let generator = generator_with(provider.clone());
        let passages = vec![passage("Graph primer", "Graphs model relationships.", 0)];
        let response = generator.generate("what is a graph", &passages, &[]).await;

        assert_eq!(response.status, AnswerStatus::Fallback);
        assert_eq!(response.provider, ProviderTag::Fallback);
        assert!(response.answer.contains("Graphs model relationships."));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prompt_carries_context_history_and_question_in_order() {
        let passages = vec![
            passage("Graph primer", "Graphs model relationships.", 0),
            passage("Networks", "Networks carry packets.", 0),
        ];
        let history: Vec<ChatMessage> = (0..12)
            .flat_map(|i| {
                vec![
                    ChatMessage::user(format!("q{i}")),
                    ChatMessage::assistant(format!("a{i}")),
                ]
            })
            .collect();

        let messages = build_messages("what is a graph", &passages, &history);

        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Source: Graph primer"));
        assert!(messages[0].content.contains("Source: Networks"));
        // Only the last 10 history turns survive, oldest first.
        assert_eq!(messages.len(), 1 + 10 + 1);
        assert_eq!(messages[1].content, "q7");
        assert_eq!(messages[messages.len() - 1].content, "what is a graph");
        assert_eq!(messages[messages.len() - 1].role, "user");
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&AnswerStatus::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&ProviderTag::OpenAi).unwrap(), "\"openai\"");
        assert_eq!(
            serde_json::to_string(&ProviderTag::Fallback).unwrap(),
            "\"fallback\""
        );
    }
}
