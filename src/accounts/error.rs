//! Account errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Connection not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type AccountResult<T> = std::result::Result<T, AccountError>;
