use pollbot_core::config::{AppConfig, LoadOptions};
use pollbot_db::{connect_existing, migrations};
use serde::Serialize;

use crate::commands::{
    CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_MIGRATION, EXIT_OK, EXIT_RUNTIME,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
    #[serde(skip)]
    exit_code: u8,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into(), exit_code: EXIT_OK }
    }

    fn warn(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Warn, details: details.into(), exit_code: EXIT_OK }
    }

    fn fail(name: &'static str, details: impl Into<String>, exit_code: u8) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into(), exit_code }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self {
            name,
            status: CheckStatus::Skipped,
            details: format!("skipped because {reason}"),
            exit_code: EXIT_OK,
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

impl DoctorReport {
    fn exit_code(&self) -> u8 {
        self.checks
            .iter()
            .map(|check| check.exit_code)
            .find(|code| *code != EXIT_OK)
            .unwrap_or(EXIT_OK)
    }
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = report.exit_code();

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_mattermost_integration(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            let reason = "configuration did not load";
            checks.push(DoctorCheck::fail("config_validation", error.to_string(), EXIT_CONFIG));
            checks.push(DoctorCheck::skipped("mattermost_integration", reason));
            checks.push(DoctorCheck::skipped("database_connectivity", reason));
            checks.push(DoctorCheck::skipped("schema_version", reason));
        }
    }

    let failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_mattermost_integration(config: &AppConfig) -> DoctorCheck {
    let mut gaps = Vec::new();
    if config.mattermost.tokens.is_empty() {
        gaps.push("no slash command token configured, every request is accepted");
    }
    if config.mattermost.personal_access_token.is_none() {
        gaps.push("no personal access token, user locales and admin rights are unavailable");
    }

    if gaps.is_empty() {
        DoctorCheck::pass(
            "mattermost_integration",
            format!(
                "{} slash command token(s) and a personal access token for `{}`",
                config.mattermost.tokens.len(),
                config.mattermost.url
            ),
        )
    } else {
        DoctorCheck::warn("mattermost_integration", gaps.join("; "))
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                    EXIT_RUNTIME,
                ),
                DoctorCheck::skipped("schema_version", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_existing(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to connect to database: {error}"),
                        EXIT_DATABASE,
                    ),
                    DoctorCheck::skipped("schema_version", "the database is unreachable"),
                ];
            }
        };

        let connectivity = DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        );
        let latest = migrations::latest_version();
        let schema = match migrations::current_version(&pool).await {
            Ok(version) if version == latest => {
                DoctorCheck::pass("schema_version", format!("schema at version {version}"))
            }
            Ok(version) if version < latest => DoctorCheck::fail(
                "schema_version",
                format!("schema at version {version}, expected {latest}; run `pollbot migrate`"),
                EXIT_MIGRATION,
            ),
            Ok(version) => DoctorCheck::fail(
                "schema_version",
                format!("schema version {version} is newer than this build ({latest})"),
                EXIT_MIGRATION,
            ),
            Err(error) => DoctorCheck::fail("schema_version", error.to_string(), EXIT_DATABASE),
        };

        pool.close().await;
        vec![connectivity, schema]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Warn => "warn",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
