//! Configuration loading from disk.

use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServerConfig;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: ServerConfig = toml::from_str(&content)?;

    validate_config(&config)?;

    Ok(config)
}

/// Semantic checks serde cannot express.
pub fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
    config
        .listener
        .bind_address
        .parse::<SocketAddr>()
        .map_err(|_| {
            ConfigError::Validation(format!(
                "listener.bind_address is not a socket address: {}",
                config.listener.bind_address
            ))
        })?;

    if let Some(max_requests) = &config.rate_limit.max_requests {
        if max_requests.counter == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_requests.counter must be at least 1".to_string(),
            ));
        }
        if max_requests.window_ms == 0 {
            return Err(ConfigError::Validation(
                "rate_limit.max_requests.window_ms must be at least 1".to_string(),
            ));
        }
    }

    if config.rate_limit.max_connections == Some(0) {
        return Err(ConfigError::Validation(
            "rate_limit.max_connections must be at least 1 when set".to_string(),
        ));
    }

    Ok(())
}
