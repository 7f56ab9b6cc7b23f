use thiserror::Error;

/// Engine error taxonomy.
///
/// Only `InvalidInput`, `DimensionMismatch` and `Storage` escape the public
/// facade as errors. Provider failures are absorbed into the answer status,
/// and embedding failures on the answer path degrade to the no-context
/// fallback instead of aborting the request.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dimension mismatch: index stores {expected}-dimensional vectors, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("provider failure ({kind}): {message}")]
    ProviderFailure {
        kind: ProviderFaultKind,
        message: String,
    },
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Classification of a failed generative-provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFaultKind {
    /// Network-level failure that may succeed on retry.
    Transient,
    Auth,
    Quota,
    /// A response arrived but could not be interpreted.
    Malformed,
}

impl std::fmt::Display for ProviderFaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProviderFaultKind::Transient => "transient",
            ProviderFaultKind::Auth => "auth",
            ProviderFaultKind::Quota => "quota",
            ProviderFaultKind::Malformed => "malformed",
        };
        f.write_str(label)
    }
}

impl EngineError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        EngineError::InvalidInput(msg.into())
    }

    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        EngineError::Storage(err.to_string())
    }

    pub fn provider<S: Into<String>>(kind: ProviderFaultKind, message: S) -> Self {
        EngineError::ProviderFailure {
            kind,
            message: message.into(),
        }
    }

    /// Whether a single bounded retry is permitted for this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::ProviderFailure {
                kind: ProviderFaultKind::Transient,
                ..
            } | EngineError::Timeout(_)
        )
    }

    /// Whether the failure is the provider's own fault (misconfiguration,
    /// exhausted quota, unusable response) as opposed to a transient outage.
    pub fn is_provider_fault(&self) -> bool {
        matches!(
            self,
            EngineError::ProviderFailure {
                kind: ProviderFaultKind::Auth
                    | ProviderFaultKind::Quota
                    | ProviderFaultKind::Malformed,
                ..
            }
        )
    }
}
