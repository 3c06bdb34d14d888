use std::time::Duration;

use thiserror::Error;

/// Failure of a provider call or of backend bootstrapping.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    /// Missing or rejected credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider throttled the request.
    #[error("rate limited by provider{}", retry_after_suffix(.retry_after))]
    RateLimit { retry_after: Option<Duration> },

    /// Connection, timeout or transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// Any other non-success response or an unusable body.
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    /// The local inference server did not respond.
    #[error("backend at {base_url} is unavailable: {hint}")]
    BackendUnavailable { base_url: String, hint: String },

    /// The server does not have the requested model.
    #[error("model '{0}' is not available on the backend")]
    ModelNotFound(String),

    /// Pulling a missing model failed or timed out.
    #[error("could not acquire model '{model}': {reason}")]
    ModelAcquisition { model: String, reason: String },

    #[error("cancelled")]
    Cancelled,
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

impl LlmError {
    /// Worth retrying against the same provider after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit { .. })
    }

    /// Short machine-friendly name used in logs and notices.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth",
            Self::RateLimit { .. } => "rate_limit",
            Self::Network(_) => "network",
            Self::Provider { .. } => "provider",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::ModelNotFound(_) => "model_not_found",
            Self::ModelAcquisition { .. } => "model_acquisition",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Seconds from a `Retry-After` header. The HTTP-date form is ignored.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Provider {
                status: err.status().map(|s| s.as_u16()).unwrap_or(200),
                body: format!("undecodable response: {err}"),
            };
        }
        Self::Network(err.to_string())
    }
}
