//! Process configuration from environment variables.

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_JWT_SECRET: &str = "dev-secret";
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// True when `JWT_SECRET` was not provided.
    pub jwt_secret_is_default: bool,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub conflict_retries: u32,
    pub db_max_connections: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_secret_is_default: true,
            use_persistent_stores: false,
            database_url: None,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any key lookup (used by `from_env` and tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let jwt_secret = lookup("JWT_SECRET").filter(|s| !s.is_empty());
        let use_persistent_stores =
            parse_var("USE_PERSISTENT_STORES", lookup("USE_PERSISTENT_STORES"), false)?;
        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            bind_addr: lookup("WAREHUB_BIND_ADDR").unwrap_or(defaults.bind_addr),
            jwt_secret_is_default: jwt_secret.is_none(),
            jwt_secret: jwt_secret.unwrap_or(defaults.jwt_secret),
            use_persistent_stores,
            database_url,
            conflict_retries: parse_var(
                "WAREHUB_CONFLICT_RETRIES",
                lookup("WAREHUB_CONFLICT_RETRIES"),
                DEFAULT_CONFLICT_RETRIES,
            )?,
            db_max_connections: parse_var(
                "WAREHUB_DB_MAX_CONNECTIONS",
                lookup("WAREHUB_DB_MAX_CONNECTIONS"),
                DEFAULT_DB_MAX_CONNECTIONS,
            )?,
        })
    }
}
