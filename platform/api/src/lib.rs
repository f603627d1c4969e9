use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Shared result type for caller-facing surfaces.
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    InvalidTransition(String),
    #[error("{0}")]
    CreationFailed(String),
    #[error("internal server error")]
    Internal(Arc<anyhow::Error>),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::InvalidTransition(_) => "INVALID_TRANSITION",
            ApiError::CreationFailed(_) => "CREATION_FAILED",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    /// HTTP-style status class for the error kind.
    pub fn status(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidInput(_) => 400,
            ApiError::InvalidTransition(_) => 409,
            ApiError::CreationFailed(_) | ApiError::Internal(_) => 500,
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::Internal(Arc::new(err))
    }

    /// Render the error for callers, logging the hidden cause of internal errors.
    pub fn payload(&self) -> ErrorPayload {
        if let ApiError::Internal(cause) = self {
            tracing::error!(error = %cause, "internal error");
        }
        ErrorPayload {
            code: self.code(),
            status: self.status(),
            message: self.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self::internal(value)
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub status: u16,
    pub message: String,
}

/// Convert any error into a caller payload while hiding internals.
pub fn internal_error(err: impl Into<anyhow::Error>) -> ErrorPayload {
    ApiError::internal(err.into()).payload()
}
