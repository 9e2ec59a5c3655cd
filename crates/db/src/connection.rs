use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Opens a pool, creating the database file on first use.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    open(database_url, max_connections, timeout_secs, true).await
}

/// Opens a pool over a database that must already exist.
pub async fn connect_existing(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    open(database_url, max_connections, timeout_secs, false).await
}

async fn open(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
    create_if_missing: bool,
) -> Result<DbPool, sqlx::Error> {
    let options =
        SqliteConnectOptions::from_str(database_url)?.create_if_missing(create_if_missing);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{connect_existing, connect_with_settings};

    #[tokio::test]
    async fn file_databases_are_created_on_first_connect() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("polls.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect_with_settings(&url, 1, 5).await.expect("connect");
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("read pragma");

        assert!(path.exists());
        assert_eq!(foreign_keys, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn existing_only_connections_do_not_create_files() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("typo.db");
        let url = format!("sqlite://{}", path.display());

        let result = connect_existing(&url, 1, 5).await;

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
