use std::{env, net::SocketAddr};

use thiserror::Error;

/// Splunk endpoint and account used for every outbound management API call.
///
/// Loaded once at startup and passed explicitly into connector construction;
/// nothing below this layer reads the process environment.
#[derive(Debug, Clone)]
pub struct SplunkCredentials {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    pub bind_addr: String,
    pub bind_port: u16,
    pub splunk: SplunkCredentials,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("MCP_API_TOKEN is required and must not be empty")]
    MissingApiToken,
    #[error("SPLUNK_URL is required and must not be empty")]
    MissingSplunkUrl,
    #[error("SPLUNK_USERNAME is required and must not be empty")]
    MissingSplunkUsername,
    #[error("SPLUNK_PASSWORD is required and must not be empty")]
    MissingSplunkPassword,
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

fn required_env(name: &str, missing: ConfigError) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(missing)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_token = required_env("MCP_API_TOKEN", ConfigError::MissingApiToken)?;
        let splunk = SplunkCredentials {
            base_url: required_env("SPLUNK_URL", ConfigError::MissingSplunkUrl)?,
            username: required_env("SPLUNK_USERNAME", ConfigError::MissingSplunkUsername)?,
            password: required_env("SPLUNK_PASSWORD", ConfigError::MissingSplunkPassword)?,
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let config = Self {
            api_token,
            bind_addr,
            bind_port,
            splunk,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
