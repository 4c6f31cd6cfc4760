//! Error type shared across the pipeline.
//!
//! Every fallible operation in this crate returns [`BulkResult`]. The
//! [`ErrorKind`] carried by each error drives the retry classification at the
//! activity boundary: transient storage and network conditions are retried
//! with backoff, everything else fails the owning chunk or job outright.

use std::error::Error;
use std::fmt;

/// Error raised by pipeline components and external-service adapters.
#[derive(Debug, Clone)]
pub struct BulkError {
    pub message: String,
    pub kind: ErrorKind,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An expected source or output object is missing. Never retried.
    NotFound,
    /// Any other storage/network failure. Retried at the activity boundary.
    TransientIo,
    /// A bounded wait expired. Retried at the activity boundary.
    Timeout,
    /// Conversion or aggregation logic failure, malformed batch payload.
    Processing,
    /// Missing mandatory header fields or undecodable input. Fails the job
    /// before any chunk work is scheduled.
    MalformedInput,
    /// A caller violated a contract (bad part list, bad identifier).
    InvalidInput,
}

impl BulkError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether the activity boundary may retry this failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::TransientIo | ErrorKind::Timeout)
    }
}

impl fmt::Display for BulkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl Error for BulkError {}

pub type BulkResult<T> = Result<T, BulkError>;

impl From<serde_json::Error> for BulkError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Processing, err.to_string())
    }
}

impl From<std::io::Error> for BulkError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            _ => ErrorKind::TransientIo,
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BulkError::new(ErrorKind::TransientIo, "socket reset").is_retryable());
        assert!(BulkError::new(ErrorKind::Timeout, "drain expired").is_retryable());
        assert!(!BulkError::new(ErrorKind::NotFound, "no such key").is_retryable());
        assert!(!BulkError::new(ErrorKind::Processing, "bad payload").is_retryable());
        assert!(!BulkError::new(ErrorKind::MalformedInput, "headers").is_retryable());
    }

    #[test]
    fn io_error_maps_not_found() {
        let err: BulkError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err: BulkError = std::io::Error::other("boom").into();
        assert_eq!(err.kind, ErrorKind::TransientIo);
    }
}
