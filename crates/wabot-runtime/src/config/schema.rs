//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! prefix = "."
//! owners = ["94743404814"]
//! operator = "94743404814"
//!
//! [session]
//! dir = "auth_info"
//! session_id = "..."
//!
//! [connection]
//! reconnect_delay_ms = 1000
//!
//! [logging]
//! level = "debug"
//! filters = { wabot_framework = "trace" }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wabot_core::jid;
use wabot_framework::DispatcherConfig;
use wabot_framework::dispatcher::{DEFAULT_BUTTON_COMMAND, DEFAULT_FAILURE_MESSAGE};
use wabot_plugins::MenuConfig;

/// Number that receives the connected notice and deletion reports by default.
pub const DEFAULT_OPERATOR: &str = "94743404814";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WabotConfig {
    /// Bot behavior.
    #[serde(default)]
    pub bot: BotConfig,

    /// Credential storage and restore.
    #[serde(default)]
    pub session: SessionConfig,

    /// Connection supervision timings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BotConfig {
    /// Command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Numbers granted owner rights.
    #[serde(default = "default_owners")]
    pub owners: Vec<String>,

    /// Number (or full chat id) notified on connect and on deletions.
    #[serde(default = "default_operator")]
    pub operator: String,

    /// Display name used by the menu.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Image sent with the menu.
    #[serde(default)]
    pub menu_image_url: Option<String>,

    /// Capacity of the recent-message cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Capacity of the reply tracker.
    #[serde(default = "default_tracker_capacity")]
    pub tracker_capacity: usize,

    /// Command that button replies are routed to.
    #[serde(default = "default_button_command")]
    pub button_command: String,

    /// Reply sent when a command fails.
    #[serde(default = "default_failure_message")]
    pub failure_message: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            owners: default_owners(),
            operator: default_operator(),
            name: default_bot_name(),
            menu_image_url: None,
            cache_capacity: default_cache_capacity(),
            tracker_capacity: default_tracker_capacity(),
            button_command: default_button_command(),
            failure_message: default_failure_message(),
        }
    }
}

impl BotConfig {
    /// Returns the operator as a chat id.
    pub fn operator_jid(&self) -> String {
        if self.operator.contains('@') {
            self.operator.clone()
        } else {
            jid::user_jid(&self.operator)
        }
    }

    /// Builds the dispatcher settings.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            prefix: self.prefix.clone(),
            owners: self.owners.clone(),
            cache_capacity: self.cache_capacity,
            tracker_capacity: self.tracker_capacity,
            button_command: self.button_command.clone(),
            failure_message: self.failure_message.clone(),
        }
    }

    /// Builds the menu settings.
    pub fn menu_config(&self) -> MenuConfig {
        MenuConfig {
            bot_name: self.name.clone(),
            image_url: self.menu_image_url.clone(),
            prefix: self.prefix.clone(),
        }
    }
}

fn default_prefix() -> String {
    ".".to_string()
}

fn default_owners() -> Vec<String> {
    vec![DEFAULT_OPERATOR.to_string()]
}

fn default_operator() -> String {
    DEFAULT_OPERATOR.to_string()
}

fn default_bot_name() -> String {
    "wabot".to_string()
}

fn default_cache_capacity() -> usize {
    wabot_framework::DEFAULT_CACHE_CAPACITY
}

fn default_tracker_capacity() -> usize {
    wabot_framework::tracker::DEFAULT_TRACKER_CAPACITY
}

fn default_button_command() -> String {
    DEFAULT_BUTTON_COMMAND.to_string()
}

fn default_failure_message() -> String {
    DEFAULT_FAILURE_MESSAGE.to_string()
}

// =============================================================================
// Session
// =============================================================================

/// Credential storage and restore settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Directory holding the credential file.
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,

    /// Credential file name inside `dir`.
    #[serde(default = "default_creds_file")]
    pub creds_file: String,

    /// Restore source used when no credential is stored.
    ///
    /// Either a base64 credential blob or a remote identifier.
    #[serde(default)]
    pub session_id: Option<String>,

    /// URL a remote identifier is fetched from; `{id}` is replaced.
    #[serde(default)]
    pub remote_url_template: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            creds_file: default_creds_file(),
            session_id: None,
            remote_url_template: None,
        }
    }
}

impl SessionConfig {
    /// Full path of the credential file.
    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(&self.creds_file)
    }
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("auth_info")
}

fn default_creds_file() -> String {
    "creds.json".to_string()
}

// =============================================================================
// Connection
// =============================================================================

/// Connection supervision timings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Constant delay before reconnecting after a close.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Delay before the first connect when a credential is stored.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Delay before the first connect after a restore.
    #[serde(default = "default_restore_settle_delay_ms")]
    pub restore_settle_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            restore_settle_delay_ms: default_restore_settle_delay_ms(),
        }
    }
}

impl ConnectionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn restore_settle_delay(&self) -> Duration {
        Duration::from_millis(self.restore_settle_delay_ms)
    }
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_restore_settle_delay_ms() -> u64 {
    2000
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `Compact` otherwise.
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// When the log file is rolled over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Base level.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `wabot_framework = "trace"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rolled files kept; `0` keeps all.
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            filters: HashMap::new(),
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            thread_ids: false,
            file_location: false,
        }
    }
}

fn default_max_files() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_jid() {
        let mut bot = BotConfig::default();
        assert_eq!(bot.operator_jid(), "94743404814@s.whatsapp.net");

        bot.operator = "120363000000@g.us".into();
        assert_eq!(bot.operator_jid(), "120363000000@g.us");
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: WabotConfig =
            serde_json::from_str(r#"{ "bot": { "prefix": "!" }, "logging": { "level": "debug" } }"#)
                .unwrap();

        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.bot.cache_capacity, 200);
        assert_eq!(config.session.creds_path(), PathBuf::from("auth_info/creds.json"));
        assert_eq!(config.connection.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_dispatcher_config_mirrors_bot_section() {
        let bot = BotConfig {
            prefix: "#".into(),
            owners: vec!["94711111111".into()],
            ..Default::default()
        };
        let dispatcher = bot.dispatcher_config();
        assert_eq!(dispatcher.prefix, "#");
        assert_eq!(dispatcher.owners, vec!["94711111111"]);
        assert_eq!(dispatcher.button_command, "menu");
        assert_eq!(bot.menu_config().prefix, "#");
    }
}
