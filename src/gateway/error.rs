//! Failures of the chat-completion endpoint.
//!
//! Every variant maps to one decision the gateway has to make: retry now,
//! retry after a server-provided pause, or give up.

use std::time::Duration;
use thiserror::Error;

/// What the endpoint told us about a failed request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub http_status: Option<u16>,
    /// Error `code` from the JSON error body, e.g. "model_not_found".
    pub provider_code: Option<String>,
    /// `x-request-id` response header.
    pub request_id: Option<String>,
}

impl ErrorContext {
    pub fn from_status(status: u16) -> Self {
        Self {
            http_status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: Option<String>) -> Self {
        self.provider_code = code;
        self
    }

    pub fn with_request_id(mut self, id: Option<String>) -> Self {
        self.request_id = id;
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// 429. `retry_after` is the endpoint's `Retry-After` hint.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        retry_after: Duration,
        context: ErrorContext,
    },

    /// The endpoint (or our own size guard) refused the request as sent.
    #[error("request rejected: {message}")]
    Rejected {
        message: String,
        context: ErrorContext,
    },

    /// 5xx from the endpoint.
    #[error("endpoint unavailable: {message}")]
    Unavailable {
        message: String,
        context: ErrorContext,
    },

    /// A 2xx whose body is not a usable completion.
    #[error("malformed completion: {0}")]
    MalformedResponse(String),

    #[error("no completion within {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("gateway misconfigured: {0}")]
    Config(String),
}

impl ProviderError {
    /// Classify a non-2xx response.
    pub fn from_status(
        status: u16,
        message: impl Into<String>,
        retry_after: Duration,
        context: ErrorContext,
    ) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited {
                retry_after,
                context,
            },
            500..=599 => Self::Unavailable { message, context },
            _ => Self::Rejected { message, context },
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Client-side timeouts become `Timeout`; everything else stays a
    /// transport error.
    pub fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Transport(err)
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Unavailable { .. } | Self::Timeout(_) => true,
            Self::Transport(e) => e.is_connect() || e.is_timeout(),
            Self::Rejected { .. } | Self::MalformedResponse(_) | Self::Config(_) => false,
        }
    }

    /// Minimum pause the endpoint asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Short code for log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } => "unavailable",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Config(_) => "config",
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::RateLimited { context, .. }
            | Self::Rejected { context, .. }
            | Self::Unavailable { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.context().and_then(|c| c.request_id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes_map_to_variants() {
        let hint = Duration::from_secs(3);
        let ctx = ErrorContext::from_status;

        let err = ProviderError::from_status(429, "slow down", hint, ctx(429));
        assert_eq!(err.code(), "rate_limited");
        assert_eq!(err.retry_after(), Some(hint));
        assert!(err.is_retryable());

        let err = ProviderError::from_status(503, "HTTP 503", hint, ctx(503));
        assert_eq!(err.code(), "unavailable");
        assert_eq!(err.retry_after(), None);
        assert!(err.is_retryable());

        let err = ProviderError::from_status(404, "model not found", hint, ctx(404));
        assert_eq!(err.code(), "rejected");
        assert!(!err.is_retryable());
    }

    #[test]
    fn local_failures_are_not_retried() {
        assert!(ProviderError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!ProviderError::malformed("no choices").is_retryable());
        assert!(!ProviderError::rejected("too large").is_retryable());
        assert!(!ProviderError::config("no key").is_retryable());
    }

    #[test]
    fn request_id_is_read_from_http_context() {
        let err = ProviderError::from_status(
            500,
            "HTTP 500",
            Duration::ZERO,
            ErrorContext::from_status(500).with_request_id(Some("req-1".to_string())),
        );
        assert_eq!(err.request_id(), Some("req-1"));
        assert_eq!(err.context().and_then(|c| c.http_status), Some(500));
        assert_eq!(ProviderError::Timeout(Duration::ZERO).request_id(), None);
    }
}
