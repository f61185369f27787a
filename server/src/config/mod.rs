use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

use crate::services::EngineSettings;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/citypass";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            other => Err(ConfigError::Invalid {
                key: "STORAGE_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub storage: StorageBackend,
    pub host: IpAddr,
    pub port: u16,
    pub catalog_seed_path: Option<String>,
    pub redemption_max_retries: u32,
    pub credential_max_attempts: u32,
    pub max_order_quantity: u32,
    pub pin_length: usize,
    pub allowed_origins: Vec<String>,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| DEFAULT_ALLOWED_ORIGINS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            storage: parse_or("STORAGE_BACKEND", StorageBackend::Memory)?,
            host: parse_or("HOST", IpAddr::from([0, 0, 0, 0]))?,
            port: parse_or("PORT", 3001)?,
            catalog_seed_path: env::var("CATALOG_SEED_PATH").ok().filter(|p| !p.is_empty()),
            redemption_max_retries: parse_or::<u32>("REDEMPTION_MAX_RETRIES", 3)?.max(1),
            credential_max_attempts: parse_or::<u32>("CREDENTIAL_MAX_ATTEMPTS", 8)?.max(1),
            max_order_quantity: parse_or::<u32>("MAX_ORDER_QUANTITY", 20)?.max(1),
            pin_length: parse_or("PIN_LENGTH", 6)?,
            allowed_origins,
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            redemption_max_retries: self.redemption_max_retries,
            credential_max_attempts: self.credential_max_attempts,
            max_order_quantity: self.max_order_quantity,
        }
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
        }),
        _ => Ok(default),
    }
}
