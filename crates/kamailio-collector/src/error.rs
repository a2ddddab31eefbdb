//! Error types for scrape configuration, decoding and projection.

use thiserror::Error;

use kamailio_binrpc::BinRpcError;

/// Result type alias for collector operations.
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors surfaced by the collector.
///
/// Configuration errors are fatal at startup. Everything else is scoped to
/// one scrape cycle and is recovered by the orchestrator.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown method: {0}")]
    UnknownMethod(String),

    #[error("transport error: {0}")]
    Transport(#[from] BinRpcError),

    #[error("method {method} returned an error: [{code}] {message}")]
    Remote {
        method: String,
        code: i64,
        message: String,
    },

    #[error("malformed response for method {method}: {reason}")]
    MalformedResponse { method: String, reason: String },

    #[error("missing set ID while parsing {method}")]
    MissingSetId { method: String },
}

impl CollectorError {
    /// Whether this error must stop the process rather than one scrape.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectorError::InvalidConfiguration(_) | CollectorError::UnknownMethod(_)
        )
    }

    pub(crate) fn malformed(method: &str, reason: impl std::fmt::Display) -> Self {
        CollectorError::MalformedResponse {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A decoded value did not have the shape the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct DecodeError {
    pub expected: &'static str,
    pub found: &'static str,
}
