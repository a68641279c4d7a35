//! HTTP-like numeric status codes carried alongside every response.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A numeric status code.
///
/// Courier does not speak HTTP itself, but the transport usually does, so the
/// codes follow HTTP semantics: `2xx` success, `4xx` client errors and `5xx`
/// server errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: Self = Self(200);
    pub const BAD_REQUEST: Self = Self(400);
    pub const NOT_FOUND: Self = Self(404);
    pub const UNPROCESSABLE_ENTITY: Self = Self(422);
    pub const TOO_MANY_REQUESTS: Self = Self(429);
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// Creates a status code from its numeric value.
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// `2xx`
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// `4xx`
    pub const fn is_client_error(self) -> bool {
        self.0 >= 400 && self.0 < 500
    }

    /// `5xx`
    pub const fn is_server_error(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::OK
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> Self {
        status.0
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(StatusCode::OK.is_success());
        assert!(StatusCode::NOT_FOUND.is_client_error());
        assert!(StatusCode::TOO_MANY_REQUESTS.is_client_error());
        assert!(StatusCode::INTERNAL_SERVER_ERROR.is_server_error());
        assert!(!StatusCode::SERVICE_UNAVAILABLE.is_client_error());
    }

    #[test]
    fn test_status_default_is_ok() {
        assert_eq!(StatusCode::default(), StatusCode::OK);
        assert_eq!(StatusCode::default().as_u16(), 200);
    }

    #[test]
    fn test_status_serializes_as_number() {
        let json = serde_json::to_string(&StatusCode::UNPROCESSABLE_ENTITY).unwrap();
        assert_eq!(json, "422");
    }
}
