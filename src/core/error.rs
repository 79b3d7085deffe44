use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Library-wide error type. Every operation that talks to a model, a speech
/// or image endpoint, or the filesystem reports one of these.
#[derive(Debug, Error)]
pub enum StoryError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, reset).
    #[error("Request to {endpoint} failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The remote service answered with a non-success status.
    #[error("{service} API error (HTTP {status}): {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The service answered, but not with something we can use.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Input (from a caller or a model) violated a data-model invariant.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A precondition the caller has to satisfy first (an upload, characters).
    #[error("{0}")]
    MissingInput(String),

    /// Configuration or environment issue.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Machine-checkable classification of a [`StoryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Api,
    MalformedResponse,
    Validation,
    MissingInput,
    Configuration,
    Io,
}

impl StoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoryError::Network { .. } => ErrorKind::Network,
            StoryError::Api { .. } => ErrorKind::Api,
            StoryError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            StoryError::Validation(_) => ErrorKind::Validation,
            StoryError::MissingInput(_) => ErrorKind::MissingInput,
            StoryError::Configuration(_) => ErrorKind::Configuration,
            StoryError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn network(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        StoryError::Network {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Rate limits and server-side failures are worth another attempt; bad
    /// requests and auth failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            StoryError::Network { .. } => true,
            StoryError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let kind = StoryError::MalformedResponse("x".into()).kind();
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"malformed_response\"");
    }

    #[test]
    fn test_transient_classification() {
        let rate_limited = StoryError::Api {
            service: "OpenAI",
            status: 429,
            body: String::new(),
        };
        let unauthorized = StoryError::Api {
            service: "OpenAI",
            status: 401,
            body: String::new(),
        };
        assert!(rate_limited.is_transient());
        assert!(!unauthorized.is_transient());
        assert!(!StoryError::Validation("bad".into()).is_transient());
    }
}
