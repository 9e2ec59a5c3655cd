use thiserror::Error;

use crate::domain::poll::PollId;

/// Failure reported by a `PollStore` implementation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored row could not be decoded: {0}")]
    Decode(String),
    #[error("poll {0} does not exist")]
    MissingPoll(PollId),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PollError {
    /// The poll is gone, was never created, or its rows are incomplete.
    #[error("invalid poll: {reason}")]
    InvalidPoll { poll_id: Option<PollId>, reason: String },
    /// A write failed; prior committed state is untouched.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl PollError {
    pub fn invalid(poll_id: Option<PollId>, reason: impl Into<String>) -> Self {
        Self::InvalidPoll { poll_id, reason: reason.into() }
    }

    pub fn is_invalid_poll(&self) -> bool {
        matches!(self, Self::InvalidPoll { .. })
    }
}
