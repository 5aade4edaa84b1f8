//! Typed errors for the failure modes the pipeline reasons about.
//!
//! Everything else is plumbing and travels as [`anyhow::Error`].

use thiserror::Error;

/// Webhook authentication failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("X-Line-Signature header is missing")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidSignature,
}

/// AI backend failures.
///
/// Exactly one attempt is made per event, so every variant ends in the fallback path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Request error: {0}")]
    Connection(String),
    #[error("HTTP error: {status} - {body}")]
    HttpStatus { status: u16, body: String },
    #[error("Backend error: {code} - {message}")]
    BackendReported { code: String, message: String },
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// The failure record kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Timeout(_) => "BackendTimeoutError",
            BackendError::Connection(_) => "BackendConnectionError",
            BackendError::HttpStatus { .. } => "BackendHttpStatusError",
            BackendError::BackendReported { .. } => "BackendReportedError",
            BackendError::MalformedResponse(_) => "BackendMalformedResponse",
        }
    }
}

/// Reply send failures. Never retried: reply tokens are single-use.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Reply transport error: {0}")]
    Transport(String),
    #[error("Reply rejected: {status} - {body}")]
    HttpStatus { status: u16, body: String },
}

impl SendError {
    /// The failure record kind for this error.
    pub fn kind(&self) -> &'static str {
        "ReplySendError"
    }
}
