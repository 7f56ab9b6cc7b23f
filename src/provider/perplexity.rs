//! Perplexity chat-completions client.
//!
//! The wire shape matches OpenAI's; only the host, default model and token
//! budget differ.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::openai::{classify_status, classify_transport, extract_message_content};
use super::{ChatRequest, GenerativeProvider};
use crate::core::errors::{EngineError, ProviderFaultKind};

pub struct PerplexityProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl PerplexityProvider {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }
}

#[async_trait]
impl GenerativeProvider for PerplexityProvider {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::provider(classify_transport(&e), e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::provider(
                classify_status(status),
                format!("perplexity returned {status}: {text}"),
            ));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| EngineError::provider(ProviderFaultKind::Malformed, e.to_string()))?;

        extract_message_content(&payload)
    }
}
