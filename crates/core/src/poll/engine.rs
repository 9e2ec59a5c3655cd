use super::store::PollStore;
use crate::domain::poll::{NewPoll, PollId, PollState, StoredPoll, VoteChange, VoteOutcome};
use crate::errors::{PollError, StoreError};
use crate::localization::{tr, Text};

/// Handle on one persisted poll.
///
/// Configuration is fixed at creation and cached on the handle; everything that
/// changes over time (votes, finished flag) is read from the store on each call.
#[derive(Clone, Debug)]
pub struct Poll<S> {
    store: S,
    id: PollId,
    creator_id: String,
    message: String,
    locale: String,
    vote_options: Vec<String>,
    secret: bool,
    public: bool,
    max_votes: u32,
    bars: bool,
}

impl<S: PollStore> Poll<S> {
    /// Persists a new running poll.
    ///
    /// Without options the poll gets a Yes/No pair in its own locale, and
    /// `max_votes` is clamped into `1..=options`.
    pub async fn create(store: S, request: NewPoll) -> Result<Self, PollError> {
        let mut request = request;
        if request.vote_options.is_empty() {
            request.vote_options = vec![
                tr(&request.locale, Text::Yes).to_owned(),
                tr(&request.locale, Text::No).to_owned(),
            ];
        }
        let option_count = u32::try_from(request.vote_options.len()).unwrap_or(u32::MAX);
        request.max_votes = request.max_votes.clamp(1, option_count);

        let id = store
            .insert_poll(&request)
            .await
            .map_err(|error| PollError::invalid(None, error.to_string()))?;

        Ok(Self {
            store,
            id,
            creator_id: request.creator_id,
            message: request.message,
            locale: request.locale,
            vote_options: request.vote_options,
            secret: request.secret,
            public: request.public,
            max_votes: request.max_votes,
            bars: request.bars,
        })
    }

    /// Rebuilds a handle for an existing poll. A poll without options counts
    /// as invalid, just like a missing one.
    pub async fn load(store: S, id: PollId) -> Result<Self, PollError> {
        let stored = store
            .find_poll(id)
            .await
            .map_err(|error| PollError::invalid(Some(id), error.to_string()))?
            .ok_or_else(|| PollError::invalid(Some(id), "poll does not exist"))?;

        if stored.vote_options.is_empty() {
            return Err(PollError::invalid(Some(id), "poll has no vote options"));
        }

        Ok(Self::from_stored(store, stored))
    }

    fn from_stored(store: S, stored: StoredPoll) -> Self {
        Self {
            store,
            id: stored.id,
            creator_id: stored.creator_id,
            message: stored.message,
            locale: stored.locale,
            vote_options: stored.vote_options,
            secret: stored.secret,
            public: stored.public,
            max_votes: stored.max_votes.max(1),
            bars: stored.bars,
        }
    }

    /// Toggles `voter`'s selection of option `vote_id`.
    ///
    /// Rejections that leave the poll untouched come back as `Ok` outcomes;
    /// `Err` means the store failed.
    pub async fn vote(&self, voter: &str, vote_id: i64) -> Result<VoteOutcome, PollError> {
        if self.is_finished().await? {
            return Ok(VoteOutcome::PollFinished);
        }

        let Some(index) = self.option_index(vote_id) else {
            return Ok(VoteOutcome::InvalidIndex {
                vote_id,
                option_count: self.vote_options.len(),
            });
        };

        let held = self.votes_of(voter).await?;
        if held.contains(&index) {
            self.commit(voter, VoteChange::Retract(index)).await?;
            return Ok(VoteOutcome::Retracted);
        }

        if held.len() >= self.max_votes as usize {
            return match held.first() {
                Some(&previous) if self.max_votes == 1 => {
                    self.commit(voter, VoteChange::Replace(index)).await?;
                    Ok(VoteOutcome::Replaced { previous })
                }
                _ => Ok(VoteOutcome::CapacityExceeded { max_votes: self.max_votes }),
            };
        }

        self.commit(voter, VoteChange::Add(index)).await?;
        Ok(VoteOutcome::Recorded)
    }

    /// Finishes the poll. Calling it again changes nothing.
    pub async fn end(&self) -> Result<(), PollError> {
        self.store.mark_finished(self.id).await?;
        Ok(())
    }

    async fn commit(&self, voter: &str, change: VoteChange) -> Result<(), PollError> {
        self.store.apply_vote(self.id, voter, change).await?;
        Ok(())
    }

    fn option_index(&self, vote_id: i64) -> Option<usize> {
        usize::try_from(vote_id).ok().filter(|index| *index < self.vote_options.len())
    }

    fn read_failure(&self, error: StoreError) -> PollError {
        PollError::invalid(Some(self.id), error.to_string())
    }

    pub async fn state(&self) -> Result<PollState, PollError> {
        self.is_finished().await.map(PollState::from_finished)
    }

    pub async fn is_finished(&self) -> Result<bool, PollError> {
        self.store.is_finished(self.id).await.map_err(|error| self.read_failure(error))
    }

    pub async fn total_votes(&self) -> Result<u64, PollError> {
        self.store.total_votes(self.id).await.map_err(|error| self.read_failure(error))
    }

    pub async fn voter_count(&self) -> Result<u64, PollError> {
        self.store.voter_count(self.id).await.map_err(|error| self.read_failure(error))
    }

    pub async fn count_for(&self, vote_id: usize) -> Result<u64, PollError> {
        self.store.count_for(self.id, vote_id).await.map_err(|error| self.read_failure(error))
    }

    pub async fn voters_for(&self, vote_id: usize) -> Result<Vec<String>, PollError> {
        self.store.voters_for(self.id, vote_id).await.map_err(|error| self.read_failure(error))
    }

    pub async fn votes_of(&self, voter: &str) -> Result<Vec<usize>, PollError> {
        self.store.votes_of(self.id, voter).await.map_err(|error| self.read_failure(error))
    }

    pub fn id(&self) -> PollId {
        self.id
    }

    pub fn creator_id(&self) -> &str {
        &self.creator_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn vote_options(&self) -> &[String] {
        &self.vote_options
    }

    pub fn secret(&self) -> bool {
        self.secret
    }

    pub fn public(&self) -> bool {
        self.public
    }

    pub fn max_votes(&self) -> u32 {
        self.max_votes
    }

    pub fn bars(&self) -> bool {
        self.bars
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
