//! Error Handling Module
//!
//! Defines the error type shared by every advisory component.
//! Uses thiserror for ergonomic error definitions and exposes an
//! [`ErrorKind`] so callers branch on the category instead of the message.

use thiserror::Error;

/// Main error type for advisory operations
#[derive(Error, Debug)]
pub enum AdvisoryError {
    /// Caller supplied something unusable (bad crop, bad language, bad field)
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Uploaded image could not be decoded
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Record exists but belongs to someone else
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// A backing service was never initialized or cannot be reached
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Unrecoverable model inference failure
    #[error("Inference error: {0}")]
    Inference(String),

    /// Storage collaborator failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Request was cancelled before its result was persisted
    #[error("Request cancelled")]
    Cancelled,
}

/// Coarse error category used for branching and status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix your input
    Validation,
    NotFound,
    Forbidden,
    /// Try again later
    ServiceUnavailable,
    /// Failed for this request only
    Fatal,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl AdvisoryError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdvisoryError::Validation(_) | AdvisoryError::InvalidImage(_) => ErrorKind::Validation,
            AdvisoryError::NotFound(_) => ErrorKind::NotFound,
            AdvisoryError::Forbidden(_) => ErrorKind::Forbidden,
            AdvisoryError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            AdvisoryError::Cancelled => ErrorKind::Cancelled,
            AdvisoryError::Inference(_)
            | AdvisoryError::Storage(_)
            | AdvisoryError::Config(_)
            | AdvisoryError::Io(_)
            | AdvisoryError::Serialization(_) => ErrorKind::Fatal,
        }
    }
}

impl From<serde_json::Error> for AdvisoryError {
    fn from(err: serde_json::Error) -> Self {
        AdvisoryError::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for AdvisoryError {
    fn from(err: image::ImageError) -> Self {
        AdvisoryError::InvalidImage(err.to_string())
    }
}

/// Convenience Result type for advisory operations
pub type Result<T> = std::result::Result<T, AdvisoryError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, msg: &str) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| AdvisoryError::Config(format!("{}: {}", msg, e)))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| AdvisoryError::Config(format!("{}: {}", f(), e)))
    }
}

impl<T> ResultExt<T> for Option<T> {
    fn context(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| AdvisoryError::Validation(msg.to_string()))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.ok_or_else(|| AdvisoryError::Validation(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AdvisoryError::Validation("unknown crop 'wheat'".to_string());
        assert_eq!(format!("{}", err), "Invalid input: unknown crop 'wheat'");
    }

    #[test]
    fn test_kinds_separate_input_from_availability() {
        assert_eq!(
            AdvisoryError::InvalidImage("truncated".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AdvisoryError::ServiceUnavailable("rice model".into()).kind(),
            ErrorKind::ServiceUnavailable
        );
        assert_eq!(AdvisoryError::Inference("boom".into()).kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_result_context() {
        let result: std::result::Result<i32, std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"));

        let err = result.context("Failed to read classes").unwrap_err();
        assert!(err.to_string().contains("Failed to read classes"));
    }

    #[test]
    fn test_option_context() {
        let opt: Option<i32> = None;
        let err = opt.context("Value was None").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
