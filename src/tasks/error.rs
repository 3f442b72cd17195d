//! Task tree errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found")]
    NotFound,

    #[error("Parent task does not exist or belongs to another user")]
    InvalidParent,

    #[error("Maximum task depth exceeded")]
    DepthExceeded,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl TaskError {
    /// Machine-readable error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TaskError::NotFound => "not_found",
            TaskError::InvalidParent => "invalid_parent",
            TaskError::DepthExceeded => "depth_exceeded",
            TaskError::Validation(_) => "validation",
            TaskError::Store(_) => "internal",
        }
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;
