pub mod config;
pub mod domain;
pub mod errors;
pub mod localization;
pub mod poll;

pub use config::{AppConfig, PollDefaults};
pub use domain::poll::{NewPoll, PollId, PollState, StoredPoll, VoteChange, VoteOutcome};
pub use errors::{PollError, StoreError};
pub use poll::{InMemoryPollStore, Poll, PollStore};
