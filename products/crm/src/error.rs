use platform_api::ApiError;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::stage::Stage;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("deal {0} not found")]
    NotFound(Uuid),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid stage transition from {current} to {target}")]
    InvalidTransition { current: Stage, target: Stage },
    #[error("failed to create project for deal {deal_id}: {reason}")]
    Creation { deal_id: Uuid, reason: String },
    #[error("storage error: {0}")]
    Storage(#[from] DbErr),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn invalid_transition(current: Stage, target: Stage) -> Self {
        Self::InvalidTransition { current, target }
    }
}

impl From<PipelineError> for ApiError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::NotFound(_) => ApiError::NotFound(value.to_string()),
            PipelineError::Validation(message) => ApiError::InvalidInput(message),
            PipelineError::InvalidTransition { .. } => {
                ApiError::InvalidTransition(value.to_string())
            }
            PipelineError::Creation { .. } => ApiError::CreationFailed(value.to_string()),
            PipelineError::Storage(err) => ApiError::internal(err.into()),
        }
    }
}
