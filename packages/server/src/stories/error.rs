use common::storage::StorageError;
use sea_orm::DbErr;

use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The requester does not own the story.
    #[error("story {0} belongs to another publisher")]
    Forbidden(i32),

    #[error(transparent)]
    Store(#[from] DbErr),

    #[error(transparent)]
    Media(#[from] StorageError),
}

impl From<StoryError> for AppError {
    fn from(err: StoryError) -> Self {
        match err {
            StoryError::Validation(msg) => AppError::Validation(msg),
            StoryError::NotFound(msg) => AppError::NotFound(msg),
            StoryError::Forbidden(_) => AppError::PermissionDenied,
            StoryError::Store(e) => AppError::from(e),
            StoryError::Media(e) => AppError::from(e),
        }
    }
}
