//! Store error types

use qrdine_client::ClientError;
use thiserror::Error;

/// AppContext 错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No active restaurant")]
    NoTenant,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Profile unavailable, session ended: {0}")]
    ProfileUnavailable(String),

    /// First step of a multi-step write succeeded, a later one failed
    #[error("Partial failure: {0}")]
    PartialFailure(String),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

impl AppError {
    /// Backend unreachable; the UI blocks with a retry screen
    pub fn is_connectivity(&self) -> bool {
        matches!(self, AppError::Client(e) if e.is_connectivity())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            AppError::OrderNotFound(_) => true,
            AppError::Client(e) => e.is_not_found(),
            _ => false,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
