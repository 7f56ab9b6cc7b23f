//! OpenAI-compatible `/embeddings` HTTP adapter.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::EmbeddingClient;
use crate::core::errors::EngineError;

pub struct RemoteEmbedder {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl RemoteEmbedder {
    pub fn new(base_url: &str, api_key: Option<String>, model: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for RemoteEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let url = format!("{}/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let res = request
            .send()
            .await
            .map_err(|e| EngineError::EmbeddingUnavailable(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::EmbeddingUnavailable(format!(
                "embedding endpoint returned {status}: {text}"
            )));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| EngineError::EmbeddingUnavailable(e.to_string()))?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vector: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vector);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(EngineError::EmbeddingUnavailable(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
