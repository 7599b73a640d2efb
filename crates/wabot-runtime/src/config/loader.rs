//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Programmatic overrides ([`ConfigLoader::merge`])
//! 3. Profile-specific config file (`wabot.{profile}.toml`)
//! 4. Main config file (`wabot.toml`, or `config.toml`)
//! 5. Environment variables (`WABOT_*`)
//! 6. The bare `SESSION_ID` variable, kept for existing deployments
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `WABOT_` prefix with `__` as separator:
//!
//! - `WABOT_BOT__PREFIX=!` → `bot.prefix = "!"`
//! - `WABOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `WABOT_SESSION__SESSION_ID=...` → `session.session_id = "..."`
//!
//! # Example
//!
//! ```rust,ignore
//! use wabot_runtime::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .file("./deploy/wabot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Serialized};
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::WabotConfig;
use super::validation::validate_config;

/// Prefix of mapped environment variables.
pub const ENV_PREFIX: &str = "WABOT_";

/// Legacy variable holding the restore source.
pub const LEGACY_SESSION_ENV: &str = "SESSION_ID";

/// Configuration file names searched in each search path, in order.
const FILE_NAMES: &[&str] = &["wabot.toml", "config.toml"];

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    /// Development profile (default).
    #[default]
    Development,
    /// Production profile.
    Production,
    /// Custom profile name.
    Custom(String),
}

impl Profile {
    /// Returns the profile name as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Parses a profile name.
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Reads `WABOT_PROFILE`, defaulting to Development.
    pub fn from_env() -> Self {
        std::env::var("WABOT_PROFILE")
            .map(|p| Self::parse(&p))
            .unwrap_or_default()
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic overrides.
    figment: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.profile = Profile::parse(profile.as_ref());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables, the legacy one included.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: WabotConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration, without validating it.
    pub fn load(self) -> ConfigResult<WabotConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: WabotConfig = figment.extract()?;

        debug!(
            profile = %profile,
            prefix = %config.bot.prefix,
            logging_level = %config.logging.level,
            has_session_id = config.session.session_id.is_some(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Loads the configuration and validates it.
    pub fn load_validated(self) -> ConfigResult<WabotConfig> {
        let config = self.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(WabotConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
            figment = figment.merge(
                Env::raw()
                    .only(&[LEGACY_SESSION_ENV])
                    .map(|_| "session.session_id".into()),
            );
        }

        Ok(figment)
    }

    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => Err(ConfigError::Extract(format!(
                "unsupported or disabled file format `.{ext}` ({})",
                path.display()
            ))),
        }
    }

    /// Current directory, then `<user config dir>/wabot`, unless paths were given.
    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }

        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("wabot"));
        }
        paths
    }

    /// Merges the first base file found, preceded by its profile variant.
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        for search_path in self.resolve_search_paths() {
            for base_name in FILE_NAMES {
                let base_path = search_path.join(base_name);
                if !base_path.exists() {
                    continue;
                }

                if let Some(stem) = base_name.strip_suffix(".toml") {
                    let profile_path =
                        search_path.join(format!("{stem}.{}.toml", self.profile.as_str()));
                    if profile_path.exists() {
                        debug!(path = %profile_path.display(), "Loading profile-specific config");
                        figment = Self::merge_or_skip(figment, &profile_path);
                    }
                }

                info!(path = %base_path.display(), "Loading configuration file");
                return Self::merge_or_skip(figment, &base_path);
            }
        }

        warn!("No configuration file found, using defaults");
        figment
    }

    fn merge_or_skip(figment: Figment, path: &Path) -> Figment {
        match Self::merge_config_file(figment.clone(), path) {
            Ok(merged) => merged,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping configuration file");
                figment
            }
        }
    }
}

/// Loads and validates the configuration from the default locations.
pub fn load_config() -> ConfigResult<WabotConfig> {
    ConfigLoader::new().load_validated()
}

/// Loads and validates the configuration from a specific file.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<WabotConfig> {
    ConfigLoader::new().file(path).load_validated()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level.as_str(), "info");
        assert_eq!(config.bot.prefix, ".");
        assert_eq!(config.session.session_id, None);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wabot.toml"),
            "[bot]\nprefix = \"!\"\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.bot.operator, "94743404814");
    }

    #[test]
    fn test_profile_file_is_overridden_by_base_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wabot.production.toml"),
            "[bot]\nprefix = \"#\"\nname = \"prod-bot\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("wabot.toml"), "[bot]\nprefix = \"!\"\n").unwrap();

        let config = ConfigLoader::new()
            .profile("prod")
            .search_path(dir.path())
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.bot.prefix, "!");
        assert_eq!(config.bot.name, "prod-bot");
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::new()
            .file("/nonexistent/wabot.toml")
            .without_env()
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wabot.toml");
        std::fs::write(&path, "[bot]\nprefix = \"\"\n").unwrap();

        let result = ConfigLoader::new().file(&path).without_env().load_validated();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_legacy_session_env() {
        let dir = tempfile::tempdir().unwrap();
        // SAFETY: This is the only test touching these variables and it cleans up immediately
        unsafe {
            std::env::set_var(LEGACY_SESSION_ENV, "legacy-id");
            std::env::set_var("WABOT_BOT__PREFIX", "?");
        }
        let config = ConfigLoader::new().search_path(dir.path()).load();
        unsafe {
            std::env::remove_var(LEGACY_SESSION_ENV);
            std::env::remove_var("WABOT_BOT__PREFIX");
        }

        let config = config.unwrap();
        assert_eq!(config.session.session_id.as_deref(), Some("legacy-id"));
        assert_eq!(config.bot.prefix, "?");
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!(Profile::parse("PROD"), Profile::Production);
        assert_eq!(Profile::parse("dev"), Profile::Development);
        assert_eq!(Profile::parse("staging").as_str(), "staging");
    }
}
