use thiserror::Error;

/// Unified error type for the generation pipeline.
///
/// This aggregates transport, policy, and validation failures into actionable,
/// high-level categories. Retry and fallback behavior is driven entirely by
/// the classification methods below rather than by string matching at call
/// sites.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Upstream error: HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("circuit breaker open; retry in {retry_in_ms}ms")]
    CircuitOpen { retry_in_ms: u64 },

    #[error("operation '{operation}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("all {attempted} fallback strategies exhausted")]
    AllFallbacksExhausted { attempted: usize },

    #[error("request cancelled")]
    Cancelled,

    #[error("request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Network transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Whether a retry of the same operation can reasonably succeed.
    ///
    /// Transport failures, timeouts, and transient server responses (5xx, 429)
    /// are retryable. Validation and other 4xx responses will fail identically
    /// on every attempt and must propagate immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout { .. } => true,
            Error::Upstream { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// Whether this failure says anything about upstream health.
    ///
    /// Cancellations and local configuration/validation failures must not
    /// move the circuit breaker.
    pub(crate) fn is_circuit_failure(&self) -> bool {
        matches!(
            self,
            Error::Upstream { .. }
                | Error::Timeout { .. }
                | Error::Transport(_)
                | Error::RetriesExhausted { .. }
        )
    }

    /// Whether the error must reach the caller as-is, skipping both retry and
    /// the fallback chain.
    pub(crate) fn is_fail_fast(&self) -> bool {
        matches!(
            self,
            Error::Configuration { .. } | Error::Validation { .. } | Error::Cancelled
        )
    }

    /// Human-readable category for end users. Every error maps to something
    /// renderable; no request is left unresolved.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Upstream { status: 429, .. } => {
                "The service is rate-limited right now. Please try again in a moment."
            }
            Error::Validation { .. }
            | Error::Upstream { status: 401, .. }
            | Error::Upstream { status: 403, .. } => "The configured API credentials are invalid.",
            Error::Configuration { .. } => "The service has not been configured with an API key.",
            Error::Cancelled => "The request was cancelled.",
            Error::RetriesExhausted { source, .. } => source.user_message(),
            _ => "The service is temporarily unavailable. Please try again later.",
        }
    }
}
