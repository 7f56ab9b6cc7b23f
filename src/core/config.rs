//! Engine configuration.
//!
//! Strongly typed, loaded from the environment (the way the original
//! deployment was configured) and validated once at startup. Unrecognized
//! provider names and out-of-range values fail with named errors; an
//! explicit provider whose credential is missing is accepted here and
//! resolves to the fallback path at selection time.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;
use crate::provider::ProviderKind;

pub const DEFAULT_CHUNK_WINDOW: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit provider selection; `None` auto-detects from credentials.
    pub provider: Option<ProviderKind>,
    pub openai_api_key: Option<String>,
    pub perplexity_api_key: Option<String>,
    pub openai_base_url: String,
    pub perplexity_base_url: String,
    /// Generation model override; each provider has a default when unset.
    pub model_name: Option<String>,
    pub temperature: f32,
    pub chunk_window: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    /// Deadline for embedding and provider calls.
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider: None,
            openai_api_key: None,
            perplexity_api_key: None,
            openai_base_url: OPENAI_BASE_URL.to_string(),
            perplexity_base_url: PERPLEXITY_BASE_URL.to_string(),
            model_name: None,
            temperature: DEFAULT_TEMPERATURE,
            chunk_window: DEFAULT_CHUNK_WINDOW,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            top_k: DEFAULT_TOP_K,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    /// Load from the process environment and validate.
    pub fn from_env() -> Result<Self, EngineError> {
        let mut config = Self::default();

        if let Some(raw) = read_var("CORPUSQA_PROVIDER") {
            config.provider = Some(raw.parse()?);
        }
        config.openai_api_key = read_var("OPENAI_API_KEY");
        config.perplexity_api_key = read_var("PERPLEXITY_API_KEY");
        if let Some(url) = read_var("OPENAI_BASE_URL") {
            config.openai_base_url = url;
        }
        if let Some(url) = read_var("PERPLEXITY_BASE_URL") {
            config.perplexity_base_url = url;
        }
        config.model_name = read_var("CORPUSQA_MODEL");
        if let Some(raw) = read_var("CORPUSQA_TEMPERATURE") {
            config.temperature = parse_var("CORPUSQA_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = read_var("CORPUSQA_CHUNK_WINDOW") {
            config.chunk_window = parse_var("CORPUSQA_CHUNK_WINDOW", &raw)?;
        }
        if let Some(raw) = read_var("CORPUSQA_CHUNK_OVERLAP") {
            config.chunk_overlap = parse_var("CORPUSQA_CHUNK_OVERLAP", &raw)?;
        }
        if let Some(raw) = read_var("CORPUSQA_TOP_K") {
            config.top_k = parse_var("CORPUSQA_TOP_K", &raw)?;
        }
        if let Some(raw) = read_var("CORPUSQA_TIMEOUT_SECS") {
            config.request_timeout_secs = parse_var("CORPUSQA_TIMEOUT_SECS", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_window == 0 {
            return Err(EngineError::invalid("chunk_window must be at least 1"));
        }
        if self.chunk_overlap >= self.chunk_window {
            return Err(EngineError::invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_window ({})",
                self.chunk_overlap, self.chunk_window
            )));
        }
        if self.top_k == 0 {
            return Err(EngineError::invalid("top_k must be at least 1"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(EngineError::invalid(format!(
                "temperature ({}) must be within [0, 2]",
                self.temperature
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(EngineError::invalid("request_timeout_secs must be at least 1"));
        }
        if let Some(kind) = self.provider {
            if self.credential_for(kind).is_none() {
                tracing::warn!(
                    provider = kind.as_str(),
                    "explicit provider has no credential; generation will fall back"
                );
            }
        }
        Ok(())
    }

    pub fn credential_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::OpenAi => self.openai_api_key.as_deref(),
            ProviderKind::Perplexity => self.perplexity_api_key.as_deref(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, EngineError> {
    raw.parse()
        .map_err(|_| EngineError::InvalidInput(format!("{name} has invalid value '{raw}'")))
}
