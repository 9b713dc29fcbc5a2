//! Error types for Azure API Management operations.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for APIM operations.
pub type ApimResult<T> = Result<T, ApimError>;

/// Errors that can occur while talking to Azure API Management.
///
/// Messages are surfaced verbatim to MCP clients, so no variant may carry
/// credentials or tokens.
#[derive(Debug, Error)]
pub enum ApimError {
    /// The HTTP request could not be completed.
    #[error("HTTP request to Azure failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Azure answered with an error status.
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        /// HTTP status code.
        status: u16,
        /// ARM error code, e.g. `NotFound` or `ValidationError`.
        code: String,
        /// Human-readable message from Azure.
        message: String,
    },

    /// Acquiring an access token failed.
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Description of what went wrong.
        message: String,
    },

    /// Azure returned a body that does not match the expected contract.
    #[error("Invalid response from Azure: {message}")]
    InvalidResponse {
        /// Description of what's wrong.
        message: String,
    },

    /// A long-running operation reached a terminal state other than success.
    #[error("Operation {status}: {message}")]
    OperationFailed {
        /// Terminal status reported by Azure (`Failed`, `Canceled`).
        status: String,
        /// Error message reported by Azure.
        message: String,
    },

    /// A tool argument is syntactically present but semantically unusable.
    #[error("Invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Argument name.
        name: String,
        /// Description of what's wrong.
        message: String,
    },
}

impl ApimError {
    /// Creates an API error from a status code, deriving the ARM-style code
    /// from the status reason phrase (`404` becomes `NotFound`).
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let code = status
            .canonical_reason()
            .map_or_else(|| format!("Http{}", status.as_u16()), |r| r.replace([' ', '-'], ""));
        Self::Api {
            status: status.as_u16(),
            code,
            message: message.into(),
        }
    }

    /// Creates a `NotFound` API error for a named entity.
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::from_status(StatusCode::NOT_FOUND, format!("{kind} '{name}' was not found"))
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status if Azure answered with an error status.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = ApimError::not_found("API", "missing-id");
        assert_eq!(
            err.to_string(),
            "NotFound: API 'missing-id' was not found (HTTP 404)"
        );
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn from_status_derives_code() {
        let err = ApimError::from_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.to_string().starts_with("TooManyRequests: slow down"));
    }

    #[test]
    fn invalid_argument_display() {
        let err = ApimError::invalid_argument("versioningScheme", "expected Segment, Header or Query");
        assert_eq!(
            err.to_string(),
            "Invalid argument 'versioningScheme': expected Segment, Header or Query"
        );
    }
}
