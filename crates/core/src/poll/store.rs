use async_trait::async_trait;

use crate::domain::poll::{NewPoll, PollId, StoredPoll, VoteChange};
use crate::errors::StoreError;

/// Persistence port for polls, their options and their votes.
///
/// Every method commits before returning. Implementations must keep the
/// `(poll, voter, option)` triple unique and apply each `VoteChange` and each
/// `insert_poll` as one atomic unit.
#[async_trait]
pub trait PollStore: Send + Sync + Clone {
    /// Persists the header and all option rows, returning the assigned id.
    async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId, StoreError>;

    /// Header plus options in ordinal order. The option list may be empty if
    /// rows were removed behind the store's back.
    async fn find_poll(&self, id: PollId) -> Result<Option<StoredPoll>, StoreError>;

    async fn is_finished(&self, id: PollId) -> Result<bool, StoreError>;

    async fn mark_finished(&self, id: PollId) -> Result<(), StoreError>;

    async fn apply_vote(
        &self,
        id: PollId,
        voter: &str,
        change: VoteChange,
    ) -> Result<(), StoreError>;

    /// Option ordinals held by `voter`, ascending.
    async fn votes_of(&self, id: PollId, voter: &str) -> Result<Vec<usize>, StoreError>;

    /// Voters holding `vote_id`, in the order their votes were recorded.
    async fn voters_for(&self, id: PollId, vote_id: usize) -> Result<Vec<String>, StoreError>;

    async fn count_for(&self, id: PollId, vote_id: usize) -> Result<u64, StoreError>;

    async fn total_votes(&self, id: PollId) -> Result<u64, StoreError>;

    async fn voter_count(&self, id: PollId) -> Result<u64, StoreError>;
}
