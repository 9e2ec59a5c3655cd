use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pollbot_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_config, CommandResult, EXIT_OK};

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Entry {
    fn new(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.to_string(), env_keys }
    }
}

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(result) => return result,
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    CommandResult { exit_code: EXIT_OK, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let personal_access_token = match &config.mattermost.personal_access_token {
        Some(token) if !token.expose_secret().trim().is_empty() => "<redacted>",
        Some(_) => "<empty>",
        None => "<unset>",
    };

    vec![
        Entry::new("database.url", &config.database.url, &["POLLBOT_DATABASE_URL"]),
        Entry::new(
            "database.max_connections",
            config.database.max_connections,
            &["POLLBOT_DATABASE_MAX_CONNECTIONS"],
        ),
        Entry::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["POLLBOT_DATABASE_TIMEOUT_SECS"],
        ),
        Entry::new("mattermost.url", &config.mattermost.url, &["POLLBOT_MATTERMOST_URL"]),
        Entry::new(
            "mattermost.tokens",
            redact_tokens(config.mattermost.tokens.len()),
            &["POLLBOT_MATTERMOST_TOKENS", "POLLBOT_MATTERMOST_TOKEN"],
        ),
        Entry::new(
            "mattermost.personal_access_token",
            personal_access_token,
            &["POLLBOT_MATTERMOST_PA_TOKEN"],
        ),
        Entry::new(
            "mattermost.timeout_secs",
            config.mattermost.timeout_secs,
            &["POLLBOT_MATTERMOST_TIMEOUT_SECS"],
        ),
        Entry::new(
            "server.bind_address",
            &config.server.bind_address,
            &["POLLBOT_SERVER_BIND_ADDRESS"],
        ),
        Entry::new("server.port", config.server.port, &["POLLBOT_SERVER_PORT"]),
        Entry::new(
            "server.public_url",
            config.server.public_url.as_deref().unwrap_or("<from Host header>"),
            &["POLLBOT_SERVER_PUBLIC_URL"],
        ),
        Entry::new(
            "server.static_dir",
            config.server.static_dir.display(),
            &["POLLBOT_SERVER_STATIC_DIR"],
        ),
        Entry::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["POLLBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Entry::new("poll.progress", config.poll.progress, &["POLLBOT_POLL_PROGRESS"]),
        Entry::new("poll.public", config.poll.public, &["POLLBOT_POLL_PUBLIC"]),
        Entry::new("poll.bars", config.poll.bars, &["POLLBOT_POLL_BARS"]),
        Entry::new("poll.max_votes", config.poll.max_votes, &["POLLBOT_POLL_MAX_VOTES"]),
        Entry::new("poll.locale", &config.poll.locale, &["POLLBOT_POLL_LOCALE"]),
        Entry::new(
            "logging.level",
            &config.logging.level,
            &["POLLBOT_LOGGING_LEVEL", "POLLBOT_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["POLLBOT_LOGGING_FORMAT", "POLLBOT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("pollbot.toml"), PathBuf::from("config/pollbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_tokens(count: usize) -> String {
    match count {
        0 => "<unset>".to_string(),
        1 => "<1 token, redacted>".to_string(),
        count => format!("<{count} tokens, redacted>"),
    }
}
