use thiserror::Error;
use tracing::info;

use crate::DbPool;

/// One schema step. The applied step number is kept in `PRAGMA user_version`.
#[derive(Clone, Copy, Debug)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    sql: &'static str,
    /// `(table, column)` added by this step. The step is skipped when the column
    /// already exists, which is the case for databases written before the
    /// version marker was maintained.
    adds_column: Option<(&'static str, &'static str)>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create poll tables",
        sql: include_str!("../../../migrations/0001_create_poll_tables.sql"),
        adds_column: None,
    },
    Migration {
        version: 2,
        description: "add bars column to polls",
        sql: include_str!("../../../migrations/0002_add_poll_bars.sql"),
        adds_column: Some(("Polls", "bars")),
    },
    Migration {
        version: 3,
        description: "add locale column to polls",
        sql: include_str!("../../../migrations/0003_add_poll_locale.sql"),
        adds_column: Some(("Polls", "locale")),
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("could not read schema version: {0}")]
    Version(#[source] sqlx::Error),
    #[error("migration {version} ({description}) failed: {source}")]
    Apply {
        version: i64,
        description: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("database schema version {found} is newer than the latest known version {latest}")]
    UnknownVersion { found: i64, latest: i64 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub previous_version: i64,
    pub current_version: i64,
    pub applied: Vec<i64>,
}

pub fn latest_version() -> i64 {
    MIGRATIONS.last().map(|migration| migration.version).unwrap_or_default()
}

pub async fn current_version(pool: &DbPool) -> Result<i64, MigrationError> {
    sqlx::query_scalar::<_, i64>("PRAGMA user_version")
        .fetch_one(pool)
        .await
        .map_err(MigrationError::Version)
}

/// Brings the schema up to the latest version. Safe to call on every start.
pub async fn run_pending(pool: &DbPool) -> Result<MigrationReport, MigrationError> {
    let previous_version = current_version(pool).await?;
    let latest = latest_version();
    if previous_version > latest {
        return Err(MigrationError::UnknownVersion { found: previous_version, latest });
    }

    let mut report = MigrationReport {
        previous_version,
        current_version: previous_version,
        applied: Vec::new(),
    };

    for migration in MIGRATIONS.iter().filter(|migration| migration.version > previous_version) {
        let applied = apply(pool, migration).await.map_err(|source| MigrationError::Apply {
            version: migration.version,
            description: migration.description,
            source,
        })?;

        info!(
            event_name = "system.migration.step",
            version = migration.version,
            description = migration.description,
            applied,
            "schema migration step completed"
        );
        if applied {
            report.applied.push(migration.version);
        }
        report.current_version = migration.version;
    }

    Ok(report)
}

/// Returns whether the step's SQL ran; the version marker is bumped either way.
async fn apply(pool: &DbPool, migration: &Migration) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let already_present = match migration.adds_column {
        Some((table, column)) => {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?",
            )
            .bind(table)
            .bind(column)
            .fetch_one(&mut *tx)
            .await?;
            count > 0
        }
        None => false,
    };

    if !already_present {
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
    }
    sqlx::raw_sql(&format!("PRAGMA user_version = {}", migration.version))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(!already_present)
}
