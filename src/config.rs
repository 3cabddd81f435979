use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::db::{ConnectionConfig, PoolSettings, RetryPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub port: u16,
    pub postgres: ConnectionConfig,
    pub connect_attempts: u32,
    pub connect_delay: Duration,
    pub max_connections: u32,
    pub query_timeout: Duration,
    pub log_level: LevelFilter,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://localhost:8080";

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_ip = parse_or(&env_map, "BIND_IP", "127.0.0.1", "must be an IP address")?;
        let port = parse_or(&env_map, "PORT", "8080", "must be a valid u16")?;

        let host = required(&env_map, "POSTGRES_HOST")?;
        let pg_port: u16 = parse_or(&env_map, "POSTGRES_PORT", "5432", "must be a valid u16")?;
        let username = env_map.get("POSTGRES_USER").cloned().unwrap_or_default();
        let password = env_map.get("POSTGRES_PASSWORD").cloned().unwrap_or_default();
        let database = required(&env_map, "POSTGRES_DB")?;
        let postgres = ConnectionConfig::new(host, pg_port, username, password, database)
            .map_err(|e| ConfigError::InvalidValue("POSTGRES_*".to_string(), e.to_string()))?;

        let connect_attempts: u32 =
            parse_or(&env_map, "DB_CONNECT_ATTEMPTS", "5", "must be a valid u32")?;
        if connect_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "DB_CONNECT_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let connect_delay_ms: u64 =
            parse_or(&env_map, "DB_CONNECT_DELAY_MS", "5000", "must be a valid u64")?;

        let max_connections: u32 =
            parse_or(&env_map, "DB_MAX_CONNECTIONS", "10", "must be a valid u32")?;
        if max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "DB_MAX_CONNECTIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let query_timeout_ms: u64 =
            parse_or(&env_map, "QUERY_TIMEOUT_MS", "15000", "must be a valid u64")?;

        let log_level = parse_or(
            &env_map,
            "LOG_LEVEL",
            "info",
            "must be one of off, error, warn, info, debug, trace",
        )?;

        let cors_allowed_origins = parse_origins(
            env_map
                .get("CORS_ALLOWED_ORIGINS")
                .map(|s| s.as_str())
                .unwrap_or(DEFAULT_CORS_ORIGINS),
        )?;

        Ok(Config {
            bind_ip,
            port,
            postgres,
            connect_attempts,
            connect_delay: Duration::from_millis(connect_delay_ms),
            max_connections,
            query_timeout: Duration::from_millis(query_timeout_ms),
            log_level,
            cors_allowed_origins,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.connect_attempts, self.connect_delay)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_connections: self.max_connections,
            ..PoolSettings::default()
        }
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expected: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expected.to_string()))
}

fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    for origin in &origins {
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "CORS_ALLOWED_ORIGINS".to_string(),
                format!("origin must start with http:// or https://, got {}", origin),
            ));
        }
        if axum::http::HeaderValue::from_str(origin).is_err() {
            return Err(ConfigError::InvalidValue(
                "CORS_ALLOWED_ORIGINS".to_string(),
                format!("not a valid header value: {}", origin),
            ));
        }
    }
    Ok(origins)
}
