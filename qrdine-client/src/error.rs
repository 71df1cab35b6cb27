//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// Backend unreachable (connect failure, timeout, dropped connection)
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// HTTP request failed for another reason
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Invalid response format
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Permission denied
    #[error("Permission denied: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error (constraint violation, bad payload)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ClientError::Connectivity(err.to_string())
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Http(err)
        }
    }
}

impl ClientError {
    /// Expected failures are recovered locally with a toast or inline state
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ClientError::NotFound(_)
                | ClientError::Forbidden(_)
                | ClientError::Unauthorized
                | ClientError::Validation(_)
        )
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, ClientError::Connectivity(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ClientError::Forbidden(_) | ClientError::Unauthorized)
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
