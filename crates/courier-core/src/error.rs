//! Unified error taxonomy for the Courier kernel.
//!
//! Every failure raised while unpacking, dispatching, running middleware or
//! normalizing a handler result is a [`CoreError`]. The kernel catches all of
//! them at its top level and renders them into a response, so each variant
//! carries enough information to pick a [`StatusCode`] and a stable
//! [`ErrorCode`].

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::status::StatusCode;

// =============================================================================
// Service Errors
// =============================================================================

/// An error explicitly raised by a handler or middleware.
///
/// Service errors carry their own status code and are passed through to the
/// response largely unchanged (message + status).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    status: StatusCode,
    message: String,
}

impl ServiceError {
    /// Creates a service error with an explicit status.
    pub fn new(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    /// `400 Bad Request`.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// `404 Not Found`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// `422 Unprocessable Entity`.
    pub fn unprocessable_entity(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    /// `429 Too Many Requests`.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

// =============================================================================
// Core Errors
// =============================================================================

/// Errors that can occur while processing a request.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// Structural decode of the inbound bytes failed.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// The underlying decode diagnostic.
        reason: String,
    },

    /// A value could not be serialized for packing.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The call identifier is not registered.
    #[error("caller '{call}' not found")]
    UnknownCaller {
        /// The unresolved call identifier.
        call: String,
    },

    /// A named middleware could not be instantiated.
    #[error("middleware '{name}' could not be resolved: {reason}")]
    MiddlewareResolution {
        /// The middleware name as written in the list.
        name: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The handler returned a value that cannot become a response.
    #[error("the response type error: unsupported handler result of kind '{kind}'")]
    UnsupportedResponseType {
        /// Shape of the offending value.
        kind: &'static str,
    },

    /// Raised explicitly by a handler or middleware.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Invalid configuration (e.g. encryption without a key).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A bootstrapper failed.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// The kernel no longer accepts requests.
    #[error("kernel is shutting down")]
    ShuttingDown,

    /// Unclassified failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Creates a malformed payload error.
    pub fn malformed(reason: impl fmt::Display) -> Self {
        Self::MalformedPayload {
            reason: reason.to_string(),
        }
    }

    /// Creates an unclassified internal error.
    pub fn internal(reason: impl fmt::Display) -> Self {
        Self::Internal(reason.to_string())
    }

    /// Converts a caught panic payload into an internal error.
    ///
    /// The panic message is kept when it is a string.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast_ref::<&'static str>() {
                Some(message) => (*message).to_string(),
                None => "non-string panic payload".to_string(),
            },
        };
        Self::Internal(format!("panicked: {message}"))
    }

    /// Creates a middleware resolution error.
    pub fn middleware_resolution(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MiddlewareResolution {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Returns the status code this error is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            CoreError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            CoreError::UnknownCaller { .. } => StatusCode::NOT_FOUND,
            CoreError::Service(e) => e.status(),
            CoreError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Serialization(_)
            | CoreError::MiddlewareResolution { .. }
            | CoreError::UnsupportedResponseType { .. }
            | CoreError::InvalidConfig(_)
            | CoreError::Bootstrap(_)
            | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CoreError::MalformedPayload { .. } => ErrorCode::MalformedPayload,
            CoreError::Serialization(_) => ErrorCode::SerializationError,
            CoreError::UnknownCaller { .. } => ErrorCode::NotFound,
            CoreError::MiddlewareResolution { .. } => ErrorCode::MiddlewareResolution,
            CoreError::UnsupportedResponseType { .. } => ErrorCode::UnsupportedResponseType,
            CoreError::Service(e) => match e.status() {
                StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimited,
                StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::UnprocessableEntity,
                StatusCode::NOT_FOUND => ErrorCode::NotFound,
                status if status.is_client_error() => ErrorCode::BadRequest,
                _ => ErrorCode::ServiceError,
            },
            CoreError::ShuttingDown => ErrorCode::Unavailable,
            CoreError::InvalidConfig(_) | CoreError::Bootstrap(_) | CoreError::Internal(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Returns whether the error is attributable to the caller.
    ///
    /// Only client-class errors and service errors expose their message on
    /// the wire.
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns the message that may be shown to the remote caller.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::Service(e) => e.message().to_string(),
            e if e.is_client_error() => e.to_string(),
            CoreError::ShuttingDown => self.to_string(),
            _ => "internal server error".to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Error Codes
// =============================================================================

/// Stable error codes rendered into error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedPayload,
    BadRequest,
    NotFound,
    UnprocessableEntity,
    RateLimited,
    ServiceError,
    MiddlewareResolution,
    UnsupportedResponseType,
    SerializationError,
    Unavailable,
    InternalError,
}

impl ErrorCode {
    /// Returns the wire spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedPayload => "MALFORMED_PAYLOAD",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ServiceError => "SERVICE_ERROR",
            ErrorCode::MiddlewareResolution => "MIDDLEWARE_RESOLUTION",
            ErrorCode::UnsupportedResponseType => "UNSUPPORTED_RESPONSE_TYPE",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
