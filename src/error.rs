//! Service Errors
//!
//! A single error type shared by every service call. Callers match on
//! [`ErrorKind`] rather than on concrete error types.

use serde::{Serialize, Serializer};
use std::time::Duration;

/// Boxed underlying cause attached to a [`ServiceError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used across the crate.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or invalid records
    Data,
    /// Requested name/id is absent
    NotFound,
    /// Circuit breaker is rejecting calls
    ServiceUnavailable,
    /// Operation exceeded its deadline
    Timeout,
    /// Missing or invalid settings at startup
    Configuration,
    /// Anything unanticipated
    Internal,
}

impl ErrorKind {
    /// Whether a caller may reasonably retry the failed call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable | Self::Timeout)
    }

    /// HTTP-style status code for protocol adapters.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Data => 400,
            Self::NotFound => 404,
            Self::ServiceUnavailable => 503,
            Self::Timeout => 504,
            Self::Configuration | Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "DATA_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Error raised by any service call.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
    suggestions: Vec<String>,
    retry_after: Option<Duration>,
    #[source]
    cause: Option<BoxError>,
}

impl ServiceError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestions: Vec::new(),
            retry_after: None,
            cause: None,
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Data, message)
    }

    /// A lookup miss, carrying close matches as suggestions.
    pub fn not_found(what: &str, name: &str, similar: Vec<String>) -> Self {
        let suggestions = similar
            .into_iter()
            .map(|candidate| format!("Did you mean '{}'?", candidate))
            .collect();
        Self {
            suggestions,
            ..Self::new(ErrorKind::NotFound, format!("{} '{}' not found", what, name))
        }
    }

    /// Breaker rejection. `retry_after` is the time left until the next trial is admitted.
    pub fn service_unavailable(resource: &str, retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(
            ErrorKind::ServiceUnavailable,
            format!("service '{}' is temporarily unavailable", resource),
        )
        .with_suggestion("Retry after the circuit breaker recovery timeout");
        err.retry_after = retry_after;
        err
    }

    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("'{}' timed out after {}ms", operation, after.as_millis()),
        )
        .with_suggestion("Retry the request; the dependency may be slow")
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Append an actionable suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    /// Wire representation for a protocol adapter.
    pub fn to_json(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "kind": self.kind,
            "message": self.message,
            "suggestions": self.suggestions,
            "retryable": self.is_retryable(),
            "statusCode": self.status_code(),
        });
        if let Some(retry_after) = self.retry_after {
            body["retryAfterMs"] = serde_json::json!(retry_after.as_millis() as u64);
        }
        body
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {}", err)).with_cause(err)
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::data(format!("invalid JSON: {}", err)).with_cause(err)
    }
}

impl From<crate::config::ConfigError> for ServiceError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::configuration(err.to_string()).with_cause(err)
    }
}
