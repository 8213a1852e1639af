//! # Transport Error Taxonomy
//!
//! Every failure produced by the transport client is exactly one of two kinds:
//!
//! - **`Network`**: no response was obtained (connectivity loss, timeout,
//!   malformed request URL, or an unreadable success body).
//! - **`Http`**: a response arrived with a status outside the 2xx range.
//!
//! Errors are immutable values. They are `Clone` so the same event can be
//! returned to the caller, stored on a cache entry, and fanned out on the
//! error bus.

use serde_json::Value;
use thiserror::Error;

/// Discriminant of an [`ApiError`], useful for listeners that only branch on class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No response was received.
    Network,
    /// A response was received with a non-success status.
    Http,
}

/// A classified transport failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// No response obtained.
    #[error("network error: {message}")]
    Network {
        /// Human readable description.
        message: String,
        /// Structured context (target URL, timeout flag, ...).
        details: Value,
    },
    /// Response obtained with a status outside the success range.
    #[error("http error {status_code}: {message}")]
    Http {
        /// The numeric HTTP status code.
        status_code: u16,
        /// The body's `error` field, or a generic status message.
        message: String,
        /// The parsed response body, or `Null` when it was empty.
        details: Value,
    },
}

/// Name used for the broadcast event in the bus and notification layers.
pub type ErrorEvent = ApiError;

impl ApiError {
    /// Builds a `Network` error.
    pub fn network(message: impl Into<String>, details: Value) -> Self {
        ApiError::Network {
            message: message.into(),
            details,
        }
    }

    /// Builds an `Http` error from a status and the (possibly empty) response body.
    ///
    /// The message is the body's `error` string when present, otherwise
    /// `request failed with status N`.
    pub fn from_response(status_code: u16, body: Value) -> Self {
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("request failed with status {}", status_code));
        ApiError::Http {
            status_code,
            message,
            details: body,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Http { .. } => ErrorKind::Http,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Network { .. } => None,
            ApiError::Http { status_code, .. } => Some(*status_code),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::Network { message, .. } | ApiError::Http { message, .. } => message,
        }
    }

    pub fn details(&self) -> &Value {
        match self {
            ApiError::Network { details, .. } | ApiError::Http { details, .. } => details,
        }
    }

    /// Server or connectivity trouble. These are broadcast on the error bus.
    pub fn is_systemic(&self) -> bool {
        match self {
            ApiError::Network { .. } => true,
            ApiError::Http { status_code, .. } => *status_code >= 500,
        }
    }

    /// A 4xx failure: caused by the caller's input, never retried or broadcast.
    pub fn is_caller_local(&self) -> bool {
        matches!(self, ApiError::Http { status_code, .. } if (400..500).contains(status_code))
    }
}
