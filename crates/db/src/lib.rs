pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, connect_existing, connect_with_settings, DbPool};
pub use migrations::{run_pending, MigrationError, MigrationReport};
pub use repositories::{RepositoryError, SqlPollStore};
