use std::sync::Arc;

use pollbot_core::config::{AppConfig, ConfigError};
use pollbot_db::{connect_with_settings, run_pending, DbPool, MigrationError};
use pollbot_mattermost::{MattermostDirectory, UserDirectory};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub directory: Arc<dyn UserDirectory>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] MigrationError),
    #[error("mattermost client could not be built: {0}")]
    Directory(#[source] reqwest::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    let report = run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        schema_version = report.current_version,
        applied = report.applied.len(),
        "database migrations applied"
    );

    let directory =
        MattermostDirectory::new(&config.mattermost).map_err(BootstrapError::Directory)?;
    if !directory.has_token() {
        warn!(
            event_name = "system.bootstrap.directory_degraded",
            correlation_id = "bootstrap",
            "no personal access token configured; user locales and admin roles are unavailable"
        );
    }
    if config.mattermost.tokens.is_empty() {
        warn!(
            event_name = "system.bootstrap.token_check_disabled",
            correlation_id = "bootstrap",
            "no slash command tokens configured; every request is accepted"
        );
    }

    Ok(Application { config: Arc::new(config), db_pool, directory: Arc::new(directory) })
}
