use crate::error::ConfigError;
use crate::ws::SessionSettings;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub persistence_timeout: Duration,
    pub session: SessionSettings,
}

impl Config {
    /// Reads settings from the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .or_else(|| lookup("DB"))
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bind_addr = parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", 20u32)?;
        let timeout_ms = parse_or(&lookup, "PERSISTENCE_TIMEOUT_MS", 5_000u64)?;
        let outbound_buffer = parse_or(&lookup, "OUTBOUND_BUFFER", 64usize)?;
        let ping_secs = parse_or(&lookup, "PING_INTERVAL_SECS", 30u64)?;

        for (key, value) in [
            ("DB_MAX_CONNECTIONS", db_max_connections as u64),
            ("PERSISTENCE_TIMEOUT_MS", timeout_ms),
            ("OUTBOUND_BUFFER", outbound_buffer as u64),
            ("PING_INTERVAL_SECS", ping_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    value: value.to_string(),
                });
            }
        }

        Ok(Config {
            database_url,
            bind_addr,
            db_max_connections,
            persistence_timeout: Duration::from_millis(timeout_ms),
            session: SessionSettings {
                outbound_buffer,
                ping_interval: Duration::from_secs(ping_secs),
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
