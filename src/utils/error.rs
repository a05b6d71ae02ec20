//! Error types and handling
//!
//! Error taxonomy shared by the session registry, the recording sessions and
//! the output writers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recording manager error type
#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Maximum number of sessions reached ({0})")]
    CapacityExceeded(usize),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("Recording already finished")]
    AlreadyStopped,

    #[error("Session not recording")]
    NotRecording,

    #[error("Empty chunk")]
    EmptyChunk,

    #[error("Invalid chunk source: {0}")]
    InvalidSource(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecordingError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            RecordingError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            RecordingError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            RecordingError::AlreadyRecording => "ALREADY_RECORDING",
            RecordingError::AlreadyStopped => "ALREADY_STOPPED",
            RecordingError::NotRecording => "NOT_RECORDING",
            RecordingError::EmptyChunk => "EMPTY_CHUNK",
            RecordingError::InvalidSource(_) => "INVALID_SOURCE",
            RecordingError::StorageUnavailable(_) | RecordingError::Io(_) => "STORAGE_UNAVAILABLE",
            RecordingError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Wrap an I/O failure on the given path as `StorageUnavailable`
    pub(crate) fn storage(context: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        RecordingError::StorageUnavailable(format!("{} {}: {}", context, path.display(), err))
    }
}

impl From<RecordingError> for String {
    fn from(e: RecordingError) -> String {
        e.to_string()
    }
}

/// Flat error representation for the network layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<RecordingError> for ErrorResponse {
    fn from(error: RecordingError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using RecordingError
pub type RecordingResult<T> = Result<T, RecordingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response = ErrorResponse::from(RecordingError::CapacityExceeded(3));
        assert_eq!(response.code, "CAPACITY_EXCEEDED");
        assert_eq!(response.message, "Maximum number of sessions reached (3)");

        let response = ErrorResponse::from(RecordingError::SessionNotFound("abc".to_string()));
        assert_eq!(response.code, "SESSION_NOT_FOUND");
        assert!(response.message.contains("abc"));
    }

    #[test]
    fn test_io_errors_map_to_storage_code() {
        let err = RecordingError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(err.code(), "STORAGE_UNAVAILABLE");

        let json = serde_json::to_value(ErrorResponse::from(err)).unwrap();
        assert_eq!(json["code"], "STORAGE_UNAVAILABLE");
    }
}
