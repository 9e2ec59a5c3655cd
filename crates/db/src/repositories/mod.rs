use thiserror::Error;

use pollbot_core::{PollId, StoreError};

pub mod poll;

pub use poll::SqlPollStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("poll {0} not found")]
    NotFound(PollId),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(source) => StoreError::Backend(source.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
            RepositoryError::NotFound(id) => StoreError::MissingPoll(id),
        }
    }
}
