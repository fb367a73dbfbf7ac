//! Typed errors for the whisper client.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match on
//! the failure class and decide what to show the user.

use std::time::Duration;

use thiserror::Error;

use crate::types::JobHandle;

/// Result type alias for whisper client operations.
pub type Result<T> = std::result::Result<T, WhisperError>;

/// Errors that can occur while talking to the extraction service.
#[derive(Debug, Error)]
pub enum WhisperError {
    /// Local validation failed before any I/O (bad options, missing document)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Client configuration is unusable (empty API key, bad base URL)
    #[error("configuration error: {0}")]
    Config(String),

    /// The service rejected the credential (HTTP 401)
    #[error("authentication failed (401): {message}")]
    Auth { message: String },

    /// Submission answered with something other than 200/202
    #[error("submission rejected ({status}): {message}")]
    Submission { status: u16, message: String },

    /// Status, retrieve or usage call answered with a non-success code
    #[error("service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// The service reports the job as failed
    #[error("extraction failed with status '{status}': {message}")]
    ExtractionFailed {
        handle: Option<JobHandle>,
        status: String,
        message: String,
    },

    /// Local wait budget exhausted; the remote job may still finish
    #[error("timed out after {}s{}", waited.as_secs(), handle_suffix(handle))]
    Timeout {
        handle: Option<JobHandle>,
        waited: Duration,
    },

    /// Caller stopped waiting; whatever reached the service keeps running
    #[error("wait cancelled{}", handle_suffix(handle))]
    Cancelled { handle: Option<JobHandle> },

    /// Network-level failure (connect, TLS, broken body)
    #[error("transport error: {0}")]
    Transport(String),

    /// Response body was not the JSON we expected
    #[error("parse error: {0}")]
    Parse(String),
}

/// How a caller should treat a failure when presenting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fix the input or configuration and try again.
    Correctable,
    /// The service side failed; retrying later may help.
    Service,
    /// The job may still complete; retrieve it by handle later.
    Pending,
}

impl WhisperError {
    /// Classify this error for user-facing reporting.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) | Self::Auth { .. } => {
                ErrorClass::Correctable
            }
            Self::Timeout { .. } | Self::Cancelled { .. } => ErrorClass::Pending,
            Self::Submission { .. }
            | Self::Service { .. }
            | Self::ExtractionFailed { .. }
            | Self::Transport(_)
            | Self::Parse(_) => ErrorClass::Service,
        }
    }

    /// The job handle attached to this error, if the job was accepted.
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Self::Timeout { handle, .. }
            | Self::ExtractionFailed { handle, .. }
            | Self::Cancelled { handle } => handle.as_ref(),
            _ => None,
        }
    }
}

fn handle_suffix(handle: &Option<JobHandle>) -> String {
    match handle {
        Some(h) => format!(" (job {} may still be retrievable)", h),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message_mentions_handle() {
        let err = WhisperError::Timeout {
            handle: Some(JobHandle::new("H123")),
            waited: Duration::from_secs(200),
        };
        let msg = err.to_string();
        assert!(msg.contains("200s"));
        assert!(msg.contains("H123"));
        assert_eq!(err.class(), ErrorClass::Pending);
        assert_eq!(err.handle().map(|h| h.as_str()), Some("H123"));
    }

    #[test]
    fn test_classes() {
        assert_eq!(
            WhisperError::InvalidRequest("x".into()).class(),
            ErrorClass::Correctable
        );
        assert_eq!(
            WhisperError::Auth { message: "bad key".into() }.class(),
            ErrorClass::Correctable
        );
        assert_eq!(
            WhisperError::Submission { status: 500, message: "boom".into() }.class(),
            ErrorClass::Service
        );
        assert_eq!(WhisperError::Transport("reset".into()).class(), ErrorClass::Service);
        assert!(WhisperError::Transport("reset".into()).handle().is_none());
    }

    #[test]
    fn test_cancelled_before_acceptance_has_no_handle() {
        let err = WhisperError::Cancelled { handle: None };
        assert_eq!(err.to_string(), "wait cancelled");
        assert_eq!(err.class(), ErrorClass::Pending);
        assert!(err.handle().is_none());

        let err = WhisperError::Cancelled {
            handle: Some(JobHandle::new("H7")),
        };
        assert!(err.to_string().contains("H7"));
    }
}
