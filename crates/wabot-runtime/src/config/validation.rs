//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LogOutput, LoggingConfig, SessionConfig, WabotConfig};

/// Placeholder replaced by the session id in a remote URL template.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Validates the entire configuration.
pub fn validate_config(config: &WabotConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_session_config(&config.session)?;
    validate_logging_config(&config.logging)?;

    if config.connection.reconnect_delay_ms == 0 {
        return Err(ConfigError::invalid(
            "connection.reconnect_delay_ms",
            "must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.prefix.is_empty() {
        return Err(ConfigError::missing_field("bot.prefix"));
    }
    if bot.prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::invalid(
            "bot.prefix",
            format!("must not contain whitespace: {:?}", bot.prefix),
        ));
    }

    if bot.operator.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.operator"));
    }
    for owner in &bot.owners {
        if owner.is_empty() || !owner.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::invalid(
                "bot.owners",
                format!("expected a bare phone number, got {owner:?}"),
            ));
        }
    }

    if bot.cache_capacity == 0 {
        return Err(ConfigError::invalid("bot.cache_capacity", "must be greater than 0"));
    }
    if bot.button_command.trim().is_empty() {
        return Err(ConfigError::missing_field("bot.button_command"));
    }

    if let Some(url) = &bot.menu_image_url {
        validate_url("bot.menu_image_url", url)?;
    }

    Ok(())
}

fn validate_session_config(session: &SessionConfig) -> ConfigResult<()> {
    if session.creds_file.is_empty() {
        return Err(ConfigError::missing_field("session.creds_file"));
    }

    if let Some(id) = &session.session_id
        && id.trim().is_empty()
    {
        return Err(ConfigError::invalid("session.session_id", "must not be blank"));
    }

    if let Some(template) = &session.remote_url_template {
        validate_url("session.remote_url_template", template)?;
        if !template.contains(ID_PLACEHOLDER) {
            return Err(ConfigError::invalid(
                "session.remote_url_template",
                format!("{template:?} has no {ID_PLACEHOLDER} placeholder"),
            ));
        }
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_url(field: &'static str, url: &str) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field(field));
    }
    if !["http://", "https://"].iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid(field, format!("{url:?} is not an http(s) URL")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = WabotConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_empty_prefix() {
        let mut config = WabotConfig::default();
        config.bot.prefix = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_owner_number() {
        let mut config = WabotConfig::default();
        config.bot.owners = vec!["+94 71".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_remote_template() {
        let mut config = WabotConfig::default();
        config.session.remote_url_template = Some("https://files.example.com/session".into());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert_eq!(err.field(), Some("session.remote_url_template"));

        config.session.remote_url_template = Some("ftp://files.example.com/{id}".into());
        assert!(validate_config(&config).is_err());

        config.session.remote_url_template = Some("https://files.example.com/{id}".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = WabotConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("logs/wabot.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
