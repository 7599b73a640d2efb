//! Configuration module for the wabot runtime.
//!
//! Layered TOML/environment loading ([`ConfigLoader`]), the serde schema
//! ([`WabotConfig`]) and a validation pass ([`validate_config`]).

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, ConnectionConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SessionConfig, SpanEventConfig, WabotConfig,
};
pub use validation::validate_config;
