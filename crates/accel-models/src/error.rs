//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid job id: {0}")]
    InvalidJobId(String),

    #[error("Invalid parameter '{key}': {message}")]
    InvalidParameter { key: String, message: String },
}

impl ModelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource_limit(msg: impl Into<String>) -> Self {
        Self::ResourceLimit(msg.into())
    }

    pub fn invalid_parameter(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Errors raised before a job exists and reported straight back to the caller.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ModelError::Validation(_) | ModelError::ResourceLimit(_))
    }
}
