use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::lifecycle::ShutdownTimings;

#[derive(Debug, Clone)]
pub struct Config {
    pub env: Environment,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub shutdown: ShutdownTimings,
}

/// Deployment flavour. Selects the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub max_connections: u32,
    pub ping_interval: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub address: SocketAddr,
    pub request_timeout: Duration,
}

impl Config {
    /// Load the file named by `CONFIG_PATH`.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var("CONFIG_PATH")
            .map_err(|_| "Missing required environment variable: CONFIG_PATH".to_string())?;
        Self::from_file(Path::new(&path))
    }

    /// Read a dotenv-format file. Process environment variables take
    /// precedence over values in the file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        if !path.is_file() {
            return Err(format!("Config file does not exist: {}", path.display()));
        }

        let file: HashMap<String, String> = dotenvy::from_path_iter(path)
            .map_err(|e| format!("Cannot read config file {}: {e}", path.display()))?
            .collect::<Result<_, _>>()
            .map_err(|e| format!("Cannot parse config file {}: {e}", path.display()))?;

        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match required(&lookup, "ENV")?.as_str() {
            "local" => Environment::Local,
            "dev" => Environment::Dev,
            "prod" => Environment::Prod,
            other => return Err(format!("Invalid ENV '{other}': expected local, dev or prod")),
        };

        let log_level = value_or(&lookup, "LOG_LEVEL", "info");

        let database = DatabaseConfig {
            user: required(&lookup, "PG_USER")?,
            password: required(&lookup, "PG_PASSWORD")?,
            host: required(&lookup, "PG_HOST")?,
            port: required(&lookup, "PG_PORT")?
                .parse()
                .map_err(|e| format!("Invalid PG_PORT: {e}"))?,
            database: required(&lookup, "PG_DATABASE")?,
            max_connections: value_or(&lookup, "PG_MAX_CONNECTIONS", "10")
                .parse()
                .map_err(|e| format!("Invalid PG_MAX_CONNECTIONS: {e}"))?,
            ping_interval: nonzero_secs(
                &value_or(&lookup, "PG_PING_INTERVAL_SECS", "1"),
                "PG_PING_INTERVAL_SECS",
            )?,
            connect_timeout: nonzero_secs(
                &value_or(&lookup, "PG_CONNECT_TIMEOUT_SECS", "10"),
                "PG_CONNECT_TIMEOUT_SECS",
            )?,
        };

        let http = HttpConfig {
            address: required(&lookup, "HTTP_ADDRESS")?
                .parse()
                .map_err(|e| format!("Invalid HTTP_ADDRESS: {e}"))?,
            request_timeout: nonzero_secs(&required(&lookup, "HTTP_TIMEOUT_SECS")?, "HTTP_TIMEOUT_SECS")?,
        };

        let shutdown = ShutdownTimings {
            drain_delay: secs(
                &value_or(&lookup, "SHUTDOWN_DRAIN_DELAY_SECS", "5"),
                "SHUTDOWN_DRAIN_DELAY_SECS",
            )?,
            graceful_timeout: secs(&value_or(&lookup, "SHUTDOWN_TIMEOUT_SECS", "15"), "SHUTDOWN_TIMEOUT_SECS")?,
            hard_kill_grace: secs(
                &value_or(&lookup, "SHUTDOWN_HARD_TIMEOUT_SECS", "3"),
                "SHUTDOWN_HARD_TIMEOUT_SECS",
            )?,
        };

        Ok(Config {
            env,
            log_level,
            database,
            http,
            shutdown,
        })
    }
}

fn required<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Result<String, String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("Missing required config key: {key}"))
}

fn value_or<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn secs(value: &str, key: &str) -> Result<Duration, String> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("Invalid {key}: {e}"))
}

/// Like [`secs`], for periods and deadlines where zero is meaningless.
fn nonzero_secs(value: &str, key: &str) -> Result<Duration, String> {
    match secs(value, key)? {
        d if d.is_zero() => Err(format!("Invalid {key}: must be greater than zero")),
        d => Ok(d),
    }
}
