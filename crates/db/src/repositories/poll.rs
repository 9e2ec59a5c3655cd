use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row};

use pollbot_core::{NewPoll, PollId, PollStore, StoreError, StoredPoll, VoteChange};

use super::RepositoryError;
use crate::DbPool;

/// `PollStore` over the `Polls`, `VoteOptions` and `Votes` tables.
///
/// Handles are cheap; the controller builds one per request from the shared pool.
#[derive(Clone)]
pub struct SqlPollStore {
    pool: DbPool,
}

impl SqlPollStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, poll: &NewPoll) -> Result<PollId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO Polls
                (creator, message, locale, finished, secret, public, max_votes, bars)
             VALUES (?, ?, ?, 0, ?, ?, ?, ?)",
        )
        .bind(&poll.creator_id)
        .bind(&poll.message)
        .bind(&poll.locale)
        .bind(poll.secret)
        .bind(poll.public)
        .bind(i64::from(poll.max_votes))
        .bind(poll.bars)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (number, name) in poll.vote_options.iter().enumerate() {
            sqlx::query("INSERT INTO VoteOptions (poll_id, number, name) VALUES (?, ?, ?)")
                .bind(id)
                .bind(ordinal(number)?)
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(PollId(id))
    }

    async fn find(&self, id: PollId) -> Result<Option<StoredPoll>, RepositoryError> {
        let row = sqlx::query(
            "SELECT poll_id, creator, message, locale, finished, secret, public, max_votes, bars
             FROM Polls
             WHERE poll_id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let vote_options = sqlx::query_scalar::<_, String>(
            "SELECT name FROM VoteOptions WHERE poll_id = ? ORDER BY number ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        poll_from_row(row, vote_options).map(Some)
    }

    async fn finished(&self, id: PollId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT finished FROM Polls WHERE poll_id = ?")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn finish(&self, id: PollId) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE Polls SET finished = 1 WHERE poll_id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id));
        }
        Ok(())
    }

    async fn change_vote(
        &self,
        id: PollId,
        voter: &str,
        change: VoteChange,
    ) -> Result<(), RepositoryError> {
        match change {
            VoteChange::Add(vote_id) => {
                sqlx::query("INSERT INTO Votes (poll_id, voter, vote) VALUES (?, ?, ?)")
                    .bind(id.0)
                    .bind(voter)
                    .bind(ordinal(vote_id)?)
                    .execute(&self.pool)
                    .await?;
            }
            VoteChange::Retract(vote_id) => {
                sqlx::query("DELETE FROM Votes WHERE poll_id = ? AND voter = ? AND vote = ?")
                    .bind(id.0)
                    .bind(voter)
                    .bind(ordinal(vote_id)?)
                    .execute(&self.pool)
                    .await?;
            }
            VoteChange::Replace(vote_id) => {
                let vote = ordinal(vote_id)?;
                let mut tx = self.pool.begin().await?;
                sqlx::query("DELETE FROM Votes WHERE poll_id = ? AND voter = ?")
                    .bind(id.0)
                    .bind(voter)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO Votes (poll_id, voter, vote) VALUES (?, ?, ?)")
                    .bind(id.0)
                    .bind(voter)
                    .bind(vote)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn held_by(&self, id: PollId, voter: &str) -> Result<Vec<usize>, RepositoryError> {
        let votes = sqlx::query_scalar::<_, i64>(
            "SELECT vote FROM Votes WHERE poll_id = ? AND voter = ? ORDER BY vote ASC",
        )
        .bind(id.0)
        .bind(voter)
        .fetch_all(&self.pool)
        .await?;

        votes.into_iter().map(option_index).collect()
    }

    async fn voters(&self, id: PollId, vote_id: usize) -> Result<Vec<String>, RepositoryError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT voter FROM Votes WHERE poll_id = ? AND vote = ? ORDER BY rowid ASC",
        )
        .bind(id.0)
        .bind(ordinal(vote_id)?)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count(
        &self,
        sql: &str,
        id: PollId,
        vote_id: Option<usize>,
    ) -> Result<u64, RepositoryError> {
        let mut query = sqlx::query_scalar::<_, i64>(sql).bind(id.0);
        if let Some(vote_id) = vote_id {
            query = query.bind(ordinal(vote_id)?);
        }
        let count = query.fetch_one(&self.pool).await?;
        u64::try_from(count).map_err(|_| RepositoryError::Decode(format!("negative count {count}")))
    }
}

#[async_trait]
impl PollStore for SqlPollStore {
    async fn insert_poll(&self, poll: &NewPoll) -> Result<PollId, StoreError> {
        Ok(self.insert(poll).await?)
    }

    async fn find_poll(&self, id: PollId) -> Result<Option<StoredPoll>, StoreError> {
        Ok(self.find(id).await?)
    }

    async fn is_finished(&self, id: PollId) -> Result<bool, StoreError> {
        Ok(self.finished(id).await?)
    }

    async fn mark_finished(&self, id: PollId) -> Result<(), StoreError> {
        Ok(self.finish(id).await?)
    }

    async fn apply_vote(
        &self,
        id: PollId,
        voter: &str,
        change: VoteChange,
    ) -> Result<(), StoreError> {
        Ok(self.change_vote(id, voter, change).await?)
    }

    async fn votes_of(&self, id: PollId, voter: &str) -> Result<Vec<usize>, StoreError> {
        Ok(self.held_by(id, voter).await?)
    }

    async fn voters_for(&self, id: PollId, vote_id: usize) -> Result<Vec<String>, StoreError> {
        Ok(self.voters(id, vote_id).await?)
    }

    async fn count_for(&self, id: PollId, vote_id: usize) -> Result<u64, StoreError> {
        Ok(self
            .count("SELECT COUNT(*) FROM Votes WHERE poll_id = ? AND vote = ?", id, Some(vote_id))
            .await?)
    }

    async fn total_votes(&self, id: PollId) -> Result<u64, StoreError> {
        Ok(self.count("SELECT COUNT(*) FROM Votes WHERE poll_id = ?", id, None).await?)
    }

    async fn voter_count(&self, id: PollId) -> Result<u64, StoreError> {
        Ok(self.count("SELECT COUNT(DISTINCT voter) FROM Votes WHERE poll_id = ?", id, None).await?)
    }
}

fn poll_from_row(row: SqliteRow, vote_options: Vec<String>) -> Result<StoredPoll, RepositoryError> {
    let max_votes: i64 = row.try_get("max_votes")?;
    let max_votes = u32::try_from(max_votes)
        .map_err(|_| RepositoryError::Decode(format!("invalid max_votes `{max_votes}`")))?;

    Ok(StoredPoll {
        id: PollId(row.try_get("poll_id")?),
        creator_id: row.try_get("creator")?,
        message: row.try_get("message")?,
        locale: row.try_get("locale")?,
        vote_options,
        secret: row.try_get("secret")?,
        public: row.try_get("public")?,
        max_votes,
        bars: row.try_get("bars")?,
        finished: row.try_get("finished")?,
    })
}

fn ordinal(vote_id: usize) -> Result<i64, RepositoryError> {
    i64::try_from(vote_id)
        .map_err(|_| RepositoryError::Decode(format!("vote ordinal {vote_id} out of range")))
}

fn option_index(vote: i64) -> Result<usize, RepositoryError> {
    usize::try_from(vote)
        .map_err(|_| RepositoryError::Decode(format!("invalid stored vote `{vote}`")))
}
