use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub mattermost: MattermostConfig,
    pub server: ServerConfig,
    pub poll: PollDefaults,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct MattermostConfig {
    pub url: String,
    /// Slash command tokens accepted on poll creation. Empty disables the check.
    pub tokens: Vec<SecretString>,
    /// Personal access token used for user lookups.
    pub personal_access_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub public_url: Option<String>,
    pub static_dir: PathBuf,
    pub graceful_shutdown_secs: u64,
}

/// Flag values the command parser falls back to when a command does not set them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollDefaults {
    pub progress: bool,
    pub public: bool,
    pub bars: bool,
    pub max_votes: u32,
    pub locale: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub mattermost_url: Option<String>,
    pub mattermost_tokens: Option<Vec<String>>,
    pub personal_access_token: Option<String>,
    pub server_port: Option<u16>,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pollbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            mattermost: MattermostConfig {
                url: "http://localhost:8065".to_string(),
                tokens: Vec::new(),
                personal_access_token: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 5005,
                public_url: None,
                static_dir: PathBuf::from("assets/img"),
                graceful_shutdown_secs: 15,
            },
            poll: PollDefaults::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for PollDefaults {
    fn default() -> Self {
        Self { progress: true, public: false, bars: false, max_votes: 1, locale: "en".to_string() }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn token_list<I>(values: I) -> Vec<SecretString>
where
    I: IntoIterator<Item = String>,
{
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(secret_value)
        .collect()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl MattermostConfig {
    /// True when no token is configured or `candidate` matches one of them.
    pub fn accepts_token(&self, candidate: Option<&str>) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        let Some(candidate) = candidate else {
            return false;
        };
        self.tokens.iter().any(|token| token.expose_secret() == candidate)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pollbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(mattermost) = patch.mattermost {
            if let Some(url) = mattermost.url {
                self.mattermost.url = url;
            }
            if let Some(tokens) = mattermost.tokens {
                self.mattermost.tokens = token_list(tokens);
            }
            if let Some(token) = mattermost.token {
                self.mattermost.tokens.extend(token_list([token]));
            }
            if let Some(pat_value) = mattermost.personal_access_token {
                self.mattermost.personal_access_token = Some(secret_value(pat_value));
            }
            if let Some(timeout_secs) = mattermost.timeout_secs {
                self.mattermost.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(public_url) = server.public_url {
                self.server.public_url = Some(public_url);
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = static_dir;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(poll) = patch.poll {
            if let Some(progress) = poll.progress {
                self.poll.progress = progress;
            }
            if let Some(public) = poll.public {
                self.poll.public = public;
            }
            if let Some(bars) = poll.bars {
                self.poll.bars = bars;
            }
            if let Some(max_votes) = poll.max_votes {
                self.poll.max_votes = max_votes;
            }
            if let Some(locale) = poll.locale {
                self.poll.locale = locale;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("POLLBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("POLLBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("POLLBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("POLLBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("POLLBOT_MATTERMOST_URL") {
            self.mattermost.url = value;
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_TOKENS") {
            self.mattermost.tokens = token_list(value.split(',').map(str::to_string));
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_TOKEN") {
            self.mattermost.tokens.extend(token_list([value]));
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_PA_TOKEN") {
            self.mattermost.personal_access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_TIMEOUT_SECS") {
            self.mattermost.timeout_secs = parse_u64("POLLBOT_MATTERMOST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("POLLBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("POLLBOT_SERVER_PORT") {
            self.server.port = parse_u16("POLLBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_SERVER_PUBLIC_URL") {
            self.server.public_url = Some(value);
        }
        if let Some(value) = read_env("POLLBOT_SERVER_STATIC_DIR") {
            self.server.static_dir = PathBuf::from(value);
        }
        if let Some(value) = read_env("POLLBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("POLLBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("POLLBOT_POLL_PROGRESS") {
            self.poll.progress = parse_bool("POLLBOT_POLL_PROGRESS", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_POLL_PUBLIC") {
            self.poll.public = parse_bool("POLLBOT_POLL_PUBLIC", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_POLL_BARS") {
            self.poll.bars = parse_bool("POLLBOT_POLL_BARS", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_POLL_MAX_VOTES") {
            self.poll.max_votes = parse_u32("POLLBOT_POLL_MAX_VOTES", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_POLL_LOCALE") {
            self.poll.locale = value;
        }

        let log_level =
            read_env("POLLBOT_LOGGING_LEVEL").or_else(|| read_env("POLLBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("POLLBOT_LOGGING_FORMAT").or_else(|| read_env("POLLBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(mattermost_url) = overrides.mattermost_url {
            self.mattermost.url = mattermost_url;
        }
        if let Some(tokens) = overrides.mattermost_tokens {
            self.mattermost.tokens = token_list(tokens);
        }
        if let Some(pat_value) = overrides.personal_access_token {
            self.mattermost.personal_access_token = Some(secret_value(pat_value));
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(public_url) = overrides.public_url {
            self.server.public_url = Some(public_url);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_mattermost(&self.mattermost)?;
        validate_server(&self.server)?;
        validate_poll(&self.poll)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pollbot.toml"), PathBuf::from("config/pollbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_mattermost(mattermost: &MattermostConfig) -> Result<(), ConfigError> {
    let url = mattermost.url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "mattermost.url must start with http:// or https://".to_string(),
        ));
    }

    if mattermost.timeout_secs == 0 || mattermost.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "mattermost.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let blank_pat = mattermost
        .personal_access_token
        .as_ref()
        .map(|value| value.expose_secret().trim().is_empty())
        .unwrap_or(false);
    if blank_pat {
        return Err(ConfigError::Validation(
            "mattermost.personal_access_token is set but empty; create one under Profile > \
             Security > Personal Access Tokens or remove the setting"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if let Some(public_url) = &server.public_url {
        if !public_url.starts_with("http://") && !public_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "server.public_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_poll(poll: &PollDefaults) -> Result<(), ConfigError> {
    if poll.max_votes == 0 {
        return Err(ConfigError::Validation(
            "poll.max_votes must be greater than zero".to_string(),
        ));
    }

    if poll.locale.trim().is_empty() {
        return Err(ConfigError::Validation("poll.locale must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().to_ascii_lowercase().parse::<bool>().map_err(|_| {
        ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    mattermost: Option<MattermostPatch>,
    server: Option<ServerPatch>,
    poll: Option<PollPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MattermostPatch {
    url: Option<String>,
    tokens: Option<Vec<String>>,
    token: Option<String>,
    personal_access_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_url: Option<String>,
    static_dir: Option<PathBuf>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PollPatch {
    progress: Option<bool>,
    public: Option<bool>,
    bars: Option<bool>,
    max_votes: Option<u32>,
    locale: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
