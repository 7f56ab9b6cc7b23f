//! Generative provider boundary.
//!
//! Two remote backends speak the OpenAI chat-completions shape; selection
//! between them (or neither) happens once per configuration load in
//! `select`.

pub mod openai;
pub mod perplexity;
pub mod select;

pub use openai::OpenAiProvider;
pub use perplexity::PerplexityProvider;
pub use select::{ProviderSelector, ProviderState};

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Perplexity,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Perplexity => "perplexity",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-3.5-turbo",
            ProviderKind::Perplexity => "sonar",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        match self {
            ProviderKind::OpenAi => 1024,
            ProviderKind::Perplexity => 512,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "perplexity" => Ok(ProviderKind::Perplexity),
            other => Err(EngineError::InvalidInput(format!(
                "unrecognized provider '{other}' (expected \"openai\" or \"perplexity\")"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait GenerativeProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Non-streaming chat completion.
    async fn complete(&self, request: &ChatRequest) -> Result<String, EngineError>;
}
