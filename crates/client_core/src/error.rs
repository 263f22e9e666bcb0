use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

/// Failure of a remote call as the sync layer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Unknown(String),
}

impl SyncError {
    /// Only transport failures are worth offering a retry for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<ApiError> for SyncError {
    fn from(value: ApiError) -> Self {
        match value.code {
            ErrorCode::Validation => Self::Validation(value.message),
            ErrorCode::NotFound => Self::NotFound(value.message),
            ErrorCode::Unauthorized | ErrorCode::Forbidden | ErrorCode::Internal => {
                Self::Unknown(value.message)
            }
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_connect() || value.is_timeout() || value.is_request() {
            return Self::Network(value.to_string());
        }
        if let Some(status) = value.status() {
            return ApiError::new(ErrorCode::from_status(status.as_u16()), value.to_string())
                .into();
        }
        Self::Unknown(value.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Unknown(format!("failed to decode response: {value}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid mutation transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: crate::mutation::MutationPhase,
    pub event: crate::mutation::MutationEvent,
}

impl From<InvalidTransition> for SyncError {
    fn from(value: InvalidTransition) -> Self {
        Self::Unknown(value.to_string())
    }
}
