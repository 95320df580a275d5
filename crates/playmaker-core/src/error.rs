//! Error types for playmaker-core

use thiserror::Error;

use crate::models::ResourceHandle;

/// Result type alias using playmaker-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in playmaker-core operations
///
/// Stale versions, unknown mutation ids and version gaps are normal
/// operation of the sync core and are reported through outcome enums instead.
#[derive(Error, Debug)]
pub enum Error {
    /// The request never completed (connection failure or timeout)
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// The server answered with a non-2xx status
    #[error("Rejected by server: {reason} ({status})")]
    RejectedByServer { status: u16, reason: String },

    /// The server answered 2xx but the body was not a `{ version, payload }` snapshot
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// An optimistic mutation was requested for a resource with no cached baseline
    #[error("Resource not cached: {0}")]
    NotCached(ResourceHandle),

    /// Push transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error came from the network or the server, as opposed to local misuse.
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::NetworkFailure(_) | Self::RejectedByServer { .. } | Self::MalformedResponse(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::MalformedResponse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::RejectedByServer {
                status: status.as_u16(),
                reason: error.to_string(),
            }
        } else {
            Self::NetworkFailure(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_error_display_includes_status() {
        let error = Error::RejectedByServer {
            status: 409,
            reason: "score locked".to_string(),
        };
        assert_eq!(error.to_string(), "Rejected by server: score locked (409)");
        assert!(error.is_remote());
    }

    #[test]
    fn local_errors_are_not_remote() {
        assert!(!Error::InvalidInput("empty id".to_string()).is_remote());
        assert!(!Error::Transport("closed".to_string()).is_remote());
    }
}
