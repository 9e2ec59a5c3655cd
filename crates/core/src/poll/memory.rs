use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::PollStore;
use crate::domain::poll::{NewPoll, PollId, StoredPoll, VoteChange};
use crate::errors::StoreError;

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    polls: HashMap<PollId, StoredPoll>,
    /// `(poll, voter, option)` in insertion order.
    votes: Vec<(PollId, String, usize)>,
}

/// Process-local `PollStore`. Clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryPollStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the option rows of a poll while keeping its header and votes.
    pub async fn remove_options(&self, id: PollId) {
        let mut state = self.state.write().await;
        if let Some(poll) = state.polls.get_mut(&id) {
            poll.vote_options.clear();
        }
    }
}

impl MemoryState {
    fn poll(&self, id: PollId) -> Result<&StoredPoll, StoreError> {
        self.polls.get(&id).ok_or(StoreError::MissingPoll(id))
    }

    fn votes_in(&self, id: PollId) -> impl Iterator<Item = &(PollId, String, usize)> {
        self.votes.iter().filter(move |(poll_id, _, _)| *poll_id == id)
    }

    fn insert_vote(&mut self, id: PollId, voter: &str, vote_id: usize) {
        self.votes.retain(|(poll_id, held_by, held)| {
            !(*poll_id == id && held_by == voter && *held == vote_id)
        });
        self.votes.push((id, voter.to_owned(), vote_id));
    }
}

#[async_trait]
impl PollStore for InMemoryPollStore {
    async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId, StoreError> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = PollId(state.next_id);
        state.polls.insert(
            id,
            StoredPoll {
                id,
                creator_id: poll.creator_id.clone(),
                message: poll.message.clone(),
                locale: poll.locale.clone(),
                vote_options: poll.vote_options.clone(),
                secret: poll.secret,
                public: poll.public,
                max_votes: poll.max_votes,
                bars: poll.bars,
                finished: false,
            },
        );
        Ok(id)
    }

    async fn find_poll(&self, id: PollId) -> Result<Option<StoredPoll>, StoreError> {
        let state = self.state.read().await;
        Ok(state.polls.get(&id).cloned())
    }

    async fn is_finished(&self, id: PollId) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.poll(id)?.finished)
    }

    async fn mark_finished(&self, id: PollId) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let poll = state.polls.get_mut(&id).ok_or(StoreError::MissingPoll(id))?;
        poll.finished = true;
        Ok(())
    }

    async fn apply_vote(
        &self,
        id: PollId,
        voter: &str,
        change: VoteChange,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.poll(id)?;
        match change {
            VoteChange::Add(vote_id) => state.insert_vote(id, voter, vote_id),
            VoteChange::Retract(vote_id) => state.votes.retain(|(poll_id, held_by, held)| {
                !(*poll_id == id && held_by == voter && *held == vote_id)
            }),
            VoteChange::Replace(vote_id) => {
                state.votes.retain(|(poll_id, held_by, _)| !(*poll_id == id && held_by == voter));
                state.insert_vote(id, voter, vote_id);
            }
        }
        Ok(())
    }

    async fn votes_of(&self, id: PollId, voter: &str) -> Result<Vec<usize>, StoreError> {
        let state = self.state.read().await;
        let mut held: Vec<usize> = state
            .votes_in(id)
            .filter(|(_, held_by, _)| held_by == voter)
            .map(|(_, _, vote_id)| *vote_id)
            .collect();
        held.sort_unstable();
        Ok(held)
    }

    async fn voters_for(&self, id: PollId, vote_id: usize) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .votes_in(id)
            .filter(|(_, _, held)| *held == vote_id)
            .map(|(_, voter, _)| voter.clone())
            .collect())
    }

    async fn count_for(&self, id: PollId, vote_id: usize) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.votes_in(id).filter(|(_, _, held)| *held == vote_id).count() as u64)
    }

    async fn total_votes(&self, id: PollId) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.votes_in(id).count() as u64)
    }

    async fn voter_count(&self, id: PollId) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        let mut voters: Vec<&str> =
            state.votes_in(id).map(|(_, voter, _)| voter.as_str()).collect();
        voters.sort_unstable();
        voters.dedup();
        Ok(voters.len() as u64)
    }
}
