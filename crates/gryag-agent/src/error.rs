use thiserror::Error;

/// Error taxonomy surfaced by the LLM client and tool executor.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("provider rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("provider quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("content blocked: {reason}")]
    ContentBlocked { reason: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("tool error: {tool}: {message}")]
    Tool { tool: String, message: String },
    #[error("request cancelled after {elapsed_ms}ms")]
    Cancelled { elapsed_ms: u64 },
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Transient(_)
                | AgentError::RateLimited { .. }
                | AgentError::ProviderUnavailable(_)
        )
    }
}

impl From<AgentError> for gryag_core::CoreError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::RateLimited { retry_after_ms } => {
                gryag_core::CoreError::ProviderRateLimited { retry_after_ms }
            }
            AgentError::ContentBlocked { reason } => gryag_core::CoreError::ContentBlocked(reason),
            AgentError::InvalidRequest(msg) => gryag_core::CoreError::InvalidRequest(msg),
            AgentError::Cancelled { elapsed_ms } => gryag_core::CoreError::Timeout { ms: elapsed_ms },
            other => gryag_core::CoreError::ProviderUnavailable(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
