//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILRELAY_CONFIG` (environment variable)
//! 2. `~/.config/mailrelay/config.toml` (Linux)
//!    `%APPDATA%\mailrelay\config.toml` (Windows)
//! 3. Built-in defaults
//!
//! Credentials never live in the file; they are read from the environment.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable holding the IMAP server host name.
pub const ENV_IMAP_HOST: &str = "IMAP_HOST";
/// Environment variable holding the IMAP login user.
pub const ENV_IMAP_USER: &str = "IMAP_USER";
/// Environment variable holding the IMAP login password.
pub const ENV_IMAP_PASSWORD: &str = "IMAP_PASSWORD";
/// Environment variable holding the Slack bot token.
pub const ENV_SLACK_TOKEN: &str = "SLACK_TOKEN";
/// Optional override for the Slack Web API base URL.
pub const ENV_SLACK_API_BASE: &str = "SLACK_API_BASE_URL";

/// Errors raised while assembling the runtime configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("Required environment variable {0} is not set")]
    MissingEnv(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Mailbox polling settings.
    pub mailbox: MailboxConfig,
    /// Chat delivery settings.
    pub chat: ChatConfig,
    /// Delivery ledger location.
    pub ledger: LedgerConfig,
    /// Notification formatting.
    pub format: FormatConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override data directory for the ledger and logs.
    pub data_dir: Option<PathBuf>,
}

/// Mailbox polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// IMAPS port.
    pub port: u16,
    /// Width of the time-window criterion, in hours.
    pub window_hours: i64,
}

/// Chat delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Slack Web API base URL.
    pub api_base: String,
    /// How replies are posted.
    pub thread_mode: ThreadMode,
}

/// Delivery ledger location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite file. Defaults to `<data_dir>/ledger.sqlite3`.
    pub path: Option<PathBuf>,
}

/// Notification formatting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Maximum number of words in a delivered notification.
    pub max_words: usize,
}

/// How a message that answers an already-delivered one is posted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThreadMode {
    /// Post at top level, then once more as a reply in the parent's thread.
    #[default]
    Dual,
    /// Post once, directly into the parent's thread.
    ThreadOnly,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            port: 993,
            window_hours: 1,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".to_string(),
            thread_mode: ThreadMode::Dual,
        }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            max_words: crate::pipeline::format::DEFAULT_MAX_WORDS,
        }
    }
}

// ── Run options ─────────────────────────────────────────────────

/// Options for a single poll-and-deliver run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Mailbox folder to poll.
    pub folder: String,
    /// Destination chat channel.
    pub channel: String,
    /// Replace the default fetch criterion with a free-text search.
    pub search_text: Option<String>,
    /// Deliver even when the ledger already holds the message.
    pub skip_dedup: bool,
}

impl RunOptions {
    /// Options for a regular scheduled run.
    pub fn new(folder: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            channel: channel.into(),
            search_text: None,
            skip_dedup: false,
        }
    }

    /// Legacy debugging mode: search for `text` and resend regardless of the ledger.
    pub fn with_debug_text(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self.skip_dedup = true;
        self
    }
}

// ── Credentials ─────────────────────────────────────────────────

/// Secrets supplied out-of-band through environment variables.
#[derive(Clone)]
pub struct Credentials {
    pub imap_host: String,
    pub imap_user: String,
    pub imap_password: String,
    pub slack_token: String,
}

impl Credentials {
    /// Read all credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read all credentials through `lookup`. Every variable is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingEnv(name))
        };
        Ok(Self {
            imap_host: require(ENV_IMAP_HOST)?,
            imap_user: require(ENV_IMAP_USER)?,
            imap_password: require(ENV_IMAP_PASSWORD)?,
            slack_token: require(ENV_SLACK_TOKEN)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("imap_host", &self.imap_host)
            .field("imap_user", &self.imap_user)
            .finish_non_exhaustive()
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MAILRELAY_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("mailrelay").join("config.toml"))
}

/// Return the data directory for the ledger and logs.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailrelay")
}

/// Return the SQLite ledger path.
pub fn ledger_path(config: &Config) -> PathBuf {
    config
        .ledger
        .path
        .clone()
        .unwrap_or_else(|| data_dir(config).join("ledger.sqlite3"))
}

/// Return the Slack API base, honoring the environment override.
pub fn chat_api_base(config: &Config) -> String {
    std::env::var(ENV_SLACK_API_BASE)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.chat.api_base.clone())
}
