use crate::commands::{load_config, runtime, CommandResult, EXIT_DATABASE, EXIT_MIGRATION};
use pollbot_db::{connect_with_settings, run_pending, MigrationReport};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;
        let report = run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
        pool.close().await;
        Ok::<MigrationReport, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success("migrate", describe(&report)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("migrate", error_class, message, exit_code)
        }
    }
}

fn describe(report: &MigrationReport) -> String {
    if report.previous_version == report.current_version {
        return format!("schema already at version {}", report.current_version);
    }

    let applied: Vec<String> = report.applied.iter().map(i64::to_string).collect();
    let applied = if applied.is_empty() { "none".to_string() } else { applied.join(", ") };
    format!(
        "schema upgraded from version {} to {} (applied: {applied})",
        report.previous_version, report.current_version
    )
}
