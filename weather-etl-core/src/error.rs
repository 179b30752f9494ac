use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a location did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connection,
    RateLimited,
    ServerError,
    ClientError,
    MalformedResponse,
    PayloadTooLarge,
    MissingField,
    TypeMismatch,
    Cancelled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Connection => "connection",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ServerError => "server_error",
            FailureKind::ClientError => "client_error",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::PayloadTooLarge => "payload_too_large",
            FailureKind::MissingField => "missing_field",
            FailureKind::TypeMismatch => "type_mismatch",
            FailureKind::Cancelled => "cancelled",
        }
    }

    /// Transient failures are worth retrying unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FailureKind::Timeout
                | FailureKind::Connection
                | FailureKind::RateLimited
                | FailureKind::ServerError
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single failed HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct AttemptError {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("field '{field}' has unexpected type: expected {expected}, found {found}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

impl NormalizationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            NormalizationError::MissingField { .. } => FailureKind::MissingField,
            NormalizationError::TypeMismatch { .. } => FailureKind::TypeMismatch,
        }
    }
}

/// Failure writing a batch to one of the sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("sink task failed: {0}")]
    Task(String),
}

/// Fatal problems detected before any extraction is attempted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no locations configured")]
    NoLocations,

    #[error("location name must not be blank")]
    BlankLocationName,

    #[error("duplicate location name '{0}'")]
    DuplicateLocation(String),

    #[error("location '{name}' has invalid coordinates ({latitude}, {longitude})")]
    InvalidCoordinates {
        name: String,
        latitude: f64,
        longitude: f64,
    },

    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("backoff factor must be a finite, non-negative number of seconds (got {0})")]
    InvalidBackoff(f64),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_kinds_match_retry_taxonomy() {
        let transient = [
            FailureKind::Timeout,
            FailureKind::Connection,
            FailureKind::RateLimited,
            FailureKind::ServerError,
        ];
        for kind in transient {
            assert!(kind.is_transient(), "{kind} should be transient");
        }

        let permanent = [
            FailureKind::ClientError,
            FailureKind::MalformedResponse,
            FailureKind::PayloadTooLarge,
            FailureKind::MissingField,
            FailureKind::TypeMismatch,
            FailureKind::Cancelled,
        ];
        for kind in permanent {
            assert!(!kind.is_transient(), "{kind} should not be transient");
        }
    }

    #[test]
    fn normalization_error_maps_to_failure_kind() {
        let missing = NormalizationError::MissingField {
            field: "temperature",
        };
        assert_eq!(missing.kind(), FailureKind::MissingField);
        assert!(missing.to_string().contains("temperature"));

        let mismatch = NormalizationError::TypeMismatch {
            field: "weather_code",
            expected: "integer",
            found: "\"cloudy\"".into(),
        };
        assert_eq!(mismatch.kind(), FailureKind::TypeMismatch);
    }
}
