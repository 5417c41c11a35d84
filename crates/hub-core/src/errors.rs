//! Unified error system for the hub
//!
//! A single error type carries a machine-readable code and a human-readable
//! message. Codes render as dotted strings (`bad_request.validation_failure`)
//! so callers above the engine can classify failures without matching on text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a [`HubError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HubErrorCode {
    /// Bad input, authority or body. Permanent, never retried.
    ValidationFailure,
    /// Malformed request shape
    InvalidParam,
    /// Bytes could not be decoded
    ParseFailure,
    /// Message already merged
    Duplicate,
    /// Message lost a CRDT conflict
    Conflict,
    /// Admission quota exceeded
    RateLimited,
    /// Requested entity does not exist
    NotFound,
    /// External dependency unreachable. Transient.
    NetworkFailure,
    /// Store write or read failed
    StorageFailure,
    /// Unexpected worker or runtime failure
    Internal,
}

impl HubErrorCode {
    /// Dotted wire representation of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailure => "bad_request.validation_failure",
            Self::InvalidParam => "bad_request.invalid_param",
            Self::ParseFailure => "bad_request.parse_failure",
            Self::Duplicate => "bad_request.duplicate",
            Self::Conflict => "bad_request.conflict",
            Self::RateLimited => "bad_request.rate_limited",
            Self::NotFound => "not_found",
            Self::NetworkFailure => "unavailable.network_failure",
            Self::StorageFailure => "unavailable.storage_failure",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for HubErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for all hub operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct HubError {
    /// Error classification
    pub code: HubErrorCode,
    /// Error message describing the failure
    pub message: String,
}

impl HubError {
    /// Create an error with an explicit code
    pub fn new(code: HubErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a validation failure error
    pub fn validation_failure(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::ValidationFailure, message)
    }

    /// Create an invalid parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::InvalidParam, message)
    }

    /// Create a parse failure error
    pub fn parse_failure(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::ParseFailure, message)
    }

    /// Create a duplicate message error
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::Duplicate, message)
    }

    /// Create a CRDT conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::Conflict, message)
    }

    /// Create a rate limited error
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::RateLimited, message)
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::NotFound, message)
    }

    /// Create a network failure error
    pub fn network_failure(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::NetworkFailure, message)
    }

    /// Create a storage failure error
    pub fn storage_failure(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::StorageFailure, message)
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(HubErrorCode::Internal, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == HubErrorCode::NotFound
    }

    pub fn is_network_failure(&self) -> bool {
        self.code == HubErrorCode::NetworkFailure
    }

    /// Whether a caller may reasonably retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            HubErrorCode::NetworkFailure | HubErrorCode::StorageFailure | HubErrorCode::RateLimited
        )
    }
}

/// Standard Result type for hub operations
pub type HubResult<T> = std::result::Result<T, HubError>;

impl From<std::io::Error> for HubError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for HubError {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_param(format!("invalid configuration: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_uses_dotted_code() {
        let err = HubError::validation_failure("unknown fid");
        assert_eq!(
            err.to_string(),
            "bad_request.validation_failure: unknown fid"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let hub_err = HubError::from(io_err);
        assert!(hub_err.is_not_found());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(HubError::network_failure("ens down").is_retryable());
        assert!(HubError::rate_limited("slow down").is_retryable());
        assert!(!HubError::validation_failure("bad").is_retryable());
        assert!(!HubError::internal("boom").is_retryable());
    }
}
