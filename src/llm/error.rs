//! Provider errors.

use thiserror::Error;

/// Errors returned by the LLM backend (embeddings and generation).
///
/// Callers decide what to do with a failure from [`ProviderError::kind`],
/// never from the message text.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("LLM backend not configured: {0}")]
    NotConfigured(String),

    #[error("rate limited")]
    RateLimited { retry_after: Option<u64> },

    #[error("server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("I/O failure: {0}")]
    IoFailure(String),
}

/// Closed classification of [`ProviderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    NotConfigured,
    RateLimited,
    ServerError,
    Rejected,
    Malformed,
    IoFailure,
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::NotConfigured(_) => ProviderErrorKind::NotConfigured,
            ProviderError::RateLimited { .. } => ProviderErrorKind::RateLimited,
            ProviderError::ServerError { .. } => ProviderErrorKind::ServerError,
            ProviderError::Rejected { .. } => ProviderErrorKind::Rejected,
            ProviderError::Malformed(_) => ProviderErrorKind::Malformed,
            ProviderError::IoFailure(_) => ProviderErrorKind::IoFailure,
        }
    }

    /// Whether another attempt could succeed.
    ///
    /// Empty or undecodable replies are retried as well: the embedding API
    /// occasionally answers 200 with no vector under load.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ProviderErrorKind::RateLimited
                | ProviderErrorKind::ServerError
                | ProviderErrorKind::Malformed
                | ProviderErrorKind::IoFailure
        )
    }

    /// Server-suggested wait before retrying, in seconds.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Map a non-success HTTP status to an error.
    pub fn from_status(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let message = truncate_body(body);
        match status {
            429 => ProviderError::RateLimited { retry_after },
            500..=599 => ProviderError::ServerError { status, message },
            _ => ProviderError::Rejected { status, message },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::IoFailure(err.to_string())
        }
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 300;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
