use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::WorkflowSettings;
use crate::store::memory::DEFAULT_MAX_CAS_ATTEMPTS;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3001";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_WRITE_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_PAYMENT_DELAY_MS: u64 = 2000;
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub bind_address: SocketAddr,
    pub store_timeout: Duration,
    pub max_cas_attempts: u32,
    pub write_retry_attempts: u32,
    pub payment_delay: Duration,
    pub seed_events_path: Option<PathBuf>,
    pub cors_allowed_origins: String,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Unparseable numbers fall
    /// back to their defaults with a warning; a Postgres backend without a
    /// database URL is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        let store_backend = match lookup("STORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err("DATABASE_URL must be set for the postgres backend".to_string());
        }

        let bind_address = parsed_or(&lookup, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS.to_string());
        let bind_address = bind_address
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid BIND_ADDRESS '{}': {}", bind_address, e))?;

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: parsed_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                DEFAULT_MAX_CONNECTIONS,
            ),
            bind_address,
            store_timeout: Duration::from_millis(parsed_or(
                &lookup,
                "STORE_TIMEOUT_MS",
                DEFAULT_STORE_TIMEOUT_MS,
            )),
            max_cas_attempts: parsed_or(&lookup, "MAX_CAS_ATTEMPTS", DEFAULT_MAX_CAS_ATTEMPTS)
                .max(1),
            write_retry_attempts: parsed_or(
                &lookup,
                "WRITE_RETRY_ATTEMPTS",
                DEFAULT_WRITE_RETRY_ATTEMPTS,
            )
            .max(1),
            payment_delay: Duration::from_millis(parsed_or(
                &lookup,
                "PAYMENT_DELAY_MS",
                DEFAULT_PAYMENT_DELAY_MS,
            )),
            seed_events_path: lookup("SEED_EVENTS_PATH")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: lookup("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        })
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            store_timeout: self.store_timeout,
            retry_attempts: self.write_retry_attempts,
            ..WorkflowSettings::default()
        }
    }
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Config: ignoring invalid {}='{}'", key, raw);
                default
            }
        },
        None => default,
    }
}
