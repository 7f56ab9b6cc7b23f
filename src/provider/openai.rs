//! OpenAI chat-completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{ChatRequest, GenerativeProvider};
use crate::core::errors::{EngineError, ProviderFaultKind};

pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiProvider {
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
impl GenerativeProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": false,
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
                format!("openai returned {status}: {text}"),
            ));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| EngineError::provider(ProviderFaultKind::Malformed, e.to_string()))?;

        extract_message_content(&payload)
    }
}

pub(super) fn classify_transport(err: &reqwest::Error) -> ProviderFaultKind {
    if err.is_decode() {
        ProviderFaultKind::Malformed
    } else {
        ProviderFaultKind::Transient
    }
}

pub(super) fn classify_status(status: StatusCode) -> ProviderFaultKind {
    match status.as_u16() {
        401 | 403 => ProviderFaultKind::Auth,
        402 | 429 => ProviderFaultKind::Quota,
        500..=599 => ProviderFaultKind::Transient,
        _ => ProviderFaultKind::Malformed,
    }
}

pub(super) fn extract_message_content(payload: &Value) -> Result<String, EngineError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            EngineError::provider(
                ProviderFaultKind::Malformed,
                "response contained no message content",
            )
        })
}
