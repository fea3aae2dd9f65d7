use crate::config::types::{Config, EngineConfig, ServerConfig, UserAgentConfig};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_server_config(&config.server)?;
    validate_engine_config(&config.engine)?;
    validate_user_agent_config(&config.user_agent)?;
    Ok(())
}

/// Validates the control endpoint configuration
fn validate_server_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config.bind.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!("Invalid bind address '{}': {}", config.bind, e))
    })?;
    Ok(())
}

/// Validates fetch engine configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.worker_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "worker_name cannot be empty".to_string(),
        ));
    }

    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 1024 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 1024, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.idle_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "idle_interval_ms must be >= 10ms, got {}ms",
            config.idle_interval_ms
        )));
    }

    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be >= 1, got {}",
            config.request_timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.request_timeout_secs
    {
        return Err(ConfigError::Validation(format!(
            "connect_timeout_secs must be between 1 and request_timeout_secs ({}), got {}",
            config.request_timeout_secs, config.connect_timeout_secs
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    // Domain part should contain at least one dot
    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
    }

    #[test]
    fn test_validate_bind_address() {
        let ok = ServerConfig {
            bind: "0.0.0.0:9001".to_string(),
        };
        assert!(validate_server_config(&ok).is_ok());

        let bad = ServerConfig {
            bind: "localhost".to_string(),
        };
        assert!(validate_server_config(&bad).is_err());
    }

    #[test]
    fn test_validate_engine_limits() {
        let mut engine = EngineConfig::default();
        assert!(validate_engine_config(&engine).is_ok());

        engine.max_concurrent_fetches = 0;
        assert!(validate_engine_config(&engine).is_err());

        let mut engine = EngineConfig::default();
        engine.idle_interval_ms = 1;
        assert!(validate_engine_config(&engine).is_err());

        let mut engine = EngineConfig::default();
        engine.connect_timeout_secs = engine.request_timeout_secs + 1;
        assert!(validate_engine_config(&engine).is_err());

        let mut engine = EngineConfig::default();
        engine.worker_name = "  ".to_string();
        assert!(validate_engine_config(&engine).is_err());
    }
}
