use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Store-assigned identity of a poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(pub i64);

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PollId {
    /// Ids come back from the chat platform as strings inside action contexts.
    pub fn parse_external(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl FromStr for PollId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(Self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Running,
    Finished,
}

impl PollState {
    pub fn from_finished(finished: bool) -> Self {
        if finished {
            Self::Finished
        } else {
            Self::Running
        }
    }

    pub fn is_finished(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Creation request for a poll, before clamping and default substitution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPoll {
    pub creator_id: String,
    pub message: String,
    pub locale: String,
    pub vote_options: Vec<String>,
    pub secret: bool,
    pub public: bool,
    pub max_votes: u32,
    pub bars: bool,
}

impl NewPoll {
    pub fn new(creator_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            creator_id: creator_id.into(),
            message: message.into(),
            locale: "en".to_owned(),
            vote_options: Vec::new(),
            secret: false,
            public: false,
            max_votes: 1,
            bars: false,
        }
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn options<I, T>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.vote_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }

    pub fn max_votes(mut self, max_votes: u32) -> Self {
        self.max_votes = max_votes;
        self
    }

    pub fn bars(mut self, bars: bool) -> Self {
        self.bars = bars;
        self
    }
}

/// A poll header plus its ordered option labels as the store holds them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredPoll {
    pub id: PollId,
    pub creator_id: String,
    pub message: String,
    pub locale: String,
    pub vote_options: Vec<String>,
    pub secret: bool,
    pub public: bool,
    pub max_votes: u32,
    pub bars: bool,
    pub finished: bool,
}

/// Mutation the engine asks the store to commit atomically for one voter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteChange {
    Add(usize),
    Retract(usize),
    /// Drop every selection the voter holds, then add this one.
    Replace(usize),
}

/// Result of a single `vote` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    /// Single-vote poll: the previous selection was swapped for the new one.
    Replaced { previous: usize },
    Retracted,
    /// The voter already holds `max_votes` selections.
    CapacityExceeded { max_votes: u32 },
    InvalidIndex { vote_id: i64, option_count: usize },
    /// The poll has ended; nothing was changed.
    PollFinished,
}

impl VoteOutcome {
    /// True when the call committed a change to the voter's selections.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Recorded | Self::Replaced { .. } | Self::Retracted)
    }
}
