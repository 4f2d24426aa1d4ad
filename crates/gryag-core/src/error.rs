use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace. Each variant maps
/// to exactly one `error.kind` string sent back in a response body.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("admission throttled: chat quota exceeded")]
    AdmissionThrottledChat,

    #[error("admission throttled: user quota exceeded")]
    AdmissionThrottledUser,

    #[error("admission throttled: chat is busy")]
    AdmissionThrottledBusy,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("provider rate limited, retry after {retry_after_ms}ms")]
    ProviderRateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("content blocked: {0}")]
    ContentBlocked(String),

    #[error("tool throttled: {tool} retry after {retry_after_seconds}s")]
    ToolThrottled {
        tool: String,
        retry_after_seconds: u64,
    },

    #[error("tool invalid argument: {tool}: {reason}")]
    ToolInvalidArgument { tool: String, reason: String },

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },

    #[error("timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable error kind, sent in the response body's
    /// `error.kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::AdmissionThrottledChat
            | CoreError::AdmissionThrottledUser
            | CoreError::AdmissionThrottledBusy => "admission_throttled",
            CoreError::InvalidRequest(_) => "invalid_request",
            CoreError::PersistenceUnavailable(_) => "persistence_unavailable",
            CoreError::ProviderRateLimited { .. } => "provider_rate_limited",
            CoreError::ProviderUnavailable(_) => "provider_unavailable",
            CoreError::ContentBlocked(_) => "content_blocked",
            CoreError::ToolThrottled { .. } => "tool_throttled",
            CoreError::ToolInvalidArgument { .. } => "tool_invalid_argument",
            CoreError::ToolExecutionFailed { .. } => "tool_execution_failed",
            CoreError::Timeout { .. } => "timeout",
            CoreError::Internal(_) => "internal",
        }
    }

    /// Sub-kind for admission throttles (`chat` | `user` | `busy`), None for
    /// every other variant.
    pub fn admission_subkind(&self) -> Option<&'static str> {
        match self {
            CoreError::AdmissionThrottledChat => Some("chat"),
            CoreError::AdmissionThrottledUser => Some("user"),
            CoreError::AdmissionThrottledBusy => Some("busy"),
            _ => None,
        }
    }

    /// Whether this error should be retried by the caller rather than
    /// surfaced immediately (provider rate limits and transient
    /// unavailability only — see the retry module).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::ProviderRateLimited { .. } | CoreError::ProviderUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_variants_share_one_kind_with_distinct_subkinds() {
        assert_eq!(CoreError::AdmissionThrottledChat.kind(), "admission_throttled");
        assert_eq!(CoreError::AdmissionThrottledUser.kind(), "admission_throttled");
        assert_eq!(CoreError::AdmissionThrottledBusy.kind(), "admission_throttled");
        assert_eq!(
            CoreError::AdmissionThrottledChat.admission_subkind(),
            Some("chat")
        );
        assert_eq!(
            CoreError::AdmissionThrottledUser.admission_subkind(),
            Some("user")
        );
        assert_eq!(
            CoreError::AdmissionThrottledBusy.admission_subkind(),
            Some("busy")
        );
    }

    #[test]
    fn only_provider_errors_are_retryable() {
        assert!(CoreError::ProviderRateLimited { retry_after_ms: 500 }.is_retryable());
        assert!(CoreError::ProviderUnavailable("down".into()).is_retryable());
        assert!(!CoreError::Internal("boom".into()).is_retryable());
        assert!(!CoreError::ContentBlocked("blocked".into()).is_retryable());
    }
}
