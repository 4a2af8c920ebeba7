//! Unified error types for the Bronze core.
//!
//! Framework-level errors (lexing, parsing, registration) are defined in
//! `bronze-framework`; configuration errors live in `bronze-runtime`.

use thiserror::Error;

use crate::gateway::Method;

// =============================================================================
// Decode Errors
// =============================================================================

/// Errors raised while turning one wire frame into JSON.
///
/// Decode failures are always per-frame: receivers log them and move on.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// zlib inflate failed.
    #[error("failed to decompress frame: {0}")]
    Decompress(String),

    /// The encrypted envelope could not be decrypted.
    #[error("failed to decrypt frame: {0}")]
    Decrypt(String),

    /// The frame is not valid JSON (or not the expected shape).
    #[error("invalid frame JSON: {0}")]
    Json(String),

    /// The frame is encrypted but no key is configured.
    #[error("frame is encrypted but no encrypt key is configured")]
    MissingKey,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {url} - {reason}")]
    ConnectionFailed {
        /// The URL that failed to connect.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// A frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Gateway lookup through the REST API failed.
    #[error("gateway lookup failed: {0}")]
    GatewayLookup(#[from] ApiError),

    /// Transport not available (feature disabled).
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport type that's not available.
        transport: &'static str,
    },

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for outbound API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform answered with a non-zero application status code.
    ///
    /// The request parameters are deliberately not carried here, so the
    /// rendered error never contains message bodies or credentials.
    #[error("API request failed: {method} {route} - code {code}: {message}")]
    RequestFailed {
        /// HTTP method of the failed request.
        method: Method,
        /// Route relative to the API base.
        route: String,
        /// Platform status code.
        code: i64,
        /// Platform error message.
        message: String,
    },

    /// The HTTP exchange itself failed (network, TLS, non-2xx status).
    #[error("HTTP error on {route}: {reason}")]
    Http {
        /// Route relative to the API base.
        route: String,
        /// Reason for failure.
        reason: String,
    },

    /// The response body could not be decoded.
    #[error("failed to decode response of {route}: {reason}")]
    Decode {
        /// Route relative to the API base.
        route: String,
        /// Reason for failure.
        reason: String,
    },

    /// The gateway this handle refers to is gone.
    #[error("gateway is not connected")]
    NotConnected,

    /// The API call timed out.
    #[error("API call timed out")]
    Timeout,

    /// The operation is not supported by this requester.
    #[error("operation not supported")]
    NotSupported,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Returns the platform status code if this is a [`ApiError::RequestFailed`].
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::RequestFailed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode {
            route: String::new(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type for frame decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_renders_without_params() {
        let err = ApiError::RequestFailed {
            method: Method::Post,
            route: "message/create".into(),
            code: 40000,
            message: "bad content".into(),
        };
        assert_eq!(
            err.to_string(),
            "API request failed: POST message/create - code 40000: bad content"
        );
        assert_eq!(err.code(), Some(40000));
        assert_eq!(ApiError::Timeout.code(), None);
    }
}
