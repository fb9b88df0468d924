//! Failure taxonomy for producer calls.
//!
//! Producers report failures as [`FetchError`]. Transport layers that only
//! know `{status?, message}` hand back a [`TransportFailure`], which converts
//! into the taxonomy without the cache ever parsing HTTP itself.

use thiserror::Error;

/// Error of a single fetch attempt.
///
/// Every variant is terminal for the current attempt only; previously cached
/// data is never discarded because of it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure: connection refused, DNS, timeout, aborted call.
    #[error("network error: {message}")]
    Network {
        /// Human readable description.
        message: String,
    },
    /// The remote answered with a non-2xx status.
    #[error("http status {status}: {message}")]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Human readable description.
        message: String,
    },
    /// The payload could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Human readable description.
        message: String,
    },
}

impl FetchError {
    /// Creates a [`FetchError::Network`].
    pub fn network(message: impl Into<String>) -> Self {
        FetchError::Network {
            message: message.into(),
        }
    }

    /// Creates a [`FetchError::HttpStatus`].
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        FetchError::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Creates a [`FetchError::Decode`].
    pub fn decode(message: impl Into<String>) -> Self {
        FetchError::Decode {
            message: message.into(),
        }
    }

    /// Short label of the variant, used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "network",
            FetchError::HttpStatus { .. } => "http_status",
            FetchError::Decode { .. } => "decode",
        }
    }

    /// Returns the HTTP status if the remote answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the failure description.
    pub fn message(&self) -> &str {
        match self {
            FetchError::Network { message }
            | FetchError::HttpStatus { message, .. }
            | FetchError::Decode { message } => message,
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::decode(err.to_string())
    }
}

/// Rejection shape produced by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    /// Status code, present when a response was received.
    pub status: Option<u16>,
    /// Human readable description.
    pub message: String,
}

impl TransportFailure {
    /// Creates a new transport failure.
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        TransportFailure {
            status,
            message: message.into(),
        }
    }
}

impl From<TransportFailure> for FetchError {
    fn from(failure: TransportFailure) -> Self {
        match failure.status {
            // A rejected call that still carries a success status failed after
            // the response arrived, i.e. while reading the body.
            Some(status) if (200..300).contains(&status) => FetchError::decode(failure.message),
            Some(status) => FetchError::http_status(status, failure.message),
            None => FetchError::network(failure.message),
        }
    }
}
