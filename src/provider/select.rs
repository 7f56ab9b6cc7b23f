//! Provider resolution.
//!
//! Resolution is evaluated once per configuration load and is free of side
//! effects; the network client is built lazily on first use, so a fallback
//! resolution never pays connection setup.

use std::sync::{Arc, OnceLock};

use crate::core::config::EngineConfig;
use crate::provider::{GenerativeProvider, OpenAiProvider, PerplexityProvider, ProviderKind};

/// Resolved provider identity.
///
/// An explicit selection whose credential is missing falls back; it never
/// silently substitutes the other provider. Auto-detection prefers OpenAI,
/// then Perplexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderState {
    #[default]
    Unresolved,
    Explicit(ProviderKind),
    Auto(ProviderKind),
    Fallback,
}

impl ProviderState {
    pub fn resolve(config: &EngineConfig) -> Self {
        match config.provider {
            Some(kind) => {
                if config.credential_for(kind).is_some() {
                    ProviderState::Explicit(kind)
                } else {
                    tracing::warn!(
                        provider = kind.as_str(),
                        "explicit provider has no credential, resolving to fallback"
                    );
                    ProviderState::Fallback
                }
            }
            None => {
                if config.openai_api_key.is_some() {
                    ProviderState::Auto(ProviderKind::OpenAi)
                } else if config.perplexity_api_key.is_some() {
                    ProviderState::Auto(ProviderKind::Perplexity)
                } else {
                    ProviderState::Fallback
                }
            }
        }
    }

    pub fn kind(&self) -> Option<ProviderKind> {
        match self {
            ProviderState::Explicit(kind) | ProviderState::Auto(kind) => Some(*kind),
            ProviderState::Unresolved | ProviderState::Fallback => None,
        }
    }
}

pub struct ProviderSelector {
    state: ProviderState,
    config: EngineConfig,
    client: OnceLock<Arc<dyn GenerativeProvider>>,
}

impl ProviderSelector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: ProviderState::resolve(config),
            config: config.clone(),
            client: OnceLock::new(),
        }
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    /// Model to request from the resolved provider.
    pub fn model(&self) -> Option<String> {
        let kind = self.state.kind()?;
        Some(
            self.config
                .model_name
                .clone()
                .unwrap_or_else(|| kind.default_model().to_string()),
        )
    }

    /// The resolved provider client, constructed on first use. `None` when
    /// resolution is `Fallback`.
    pub fn provider(&self) -> Option<Arc<dyn GenerativeProvider>> {
        let kind = self.state.kind()?;
        let client = self
            .client
            .get_or_init(|| build_client(kind, &self.config));
        Some(client.clone())
    }

    #[cfg(test)]
    pub(crate) fn preloaded(
        state: ProviderState,
        client: Arc<dyn GenerativeProvider>,
        config: EngineConfig,
    ) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(client);
        Self {
            state,
            config,
            client: cell,
        }
    }
}

fn build_client(kind: ProviderKind, config: &EngineConfig) -> Arc<dyn GenerativeProvider> {
    let timeout = config.request_timeout();
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(
            &config.openai_base_url,
            config.openai_api_key.clone().unwrap_or_default(),
            timeout,
        )),
        ProviderKind::Perplexity => Arc::new(PerplexityProvider::new(
            &config.perplexity_base_url,
            config.perplexity_api_key.clone().unwrap_or_default(),
            timeout,
        )),
    }
}
