//! Storage error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for shipit_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => shipit_core::Error::NotFound(msg),
            StoreError::Duplicate(msg) => shipit_core::Error::Conflict(msg),
            StoreError::InvalidTransition(msg) => shipit_core::Error::Conflict(msg),
        }
    }
}
