use dav_api::{ApiError, StoreError};
use thiserror::Error;

/// Failure of a single sync step: either the remote call or the local store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(e) => Some(e),
            SyncError::Store(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
