//! Process-wide configuration, loaded once at startup from the environment.

use std::net::SocketAddr;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// Runtime configuration. The JWT secret is read-only shared state; rotating
/// it invalidates every outstanding session token.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
    /// Whether a user may buy the same player card more than once.
    pub allow_duplicate_owners: bool,
    /// Balance granted to new accounts; `None` leaves the balance unset
    /// until an administrative adjustment.
    pub starting_balance: Option<Decimal>,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env_or("HOST", "0.0.0.0".to_string())?;
        let port: u16 = env_or("PORT", 4000)?;
        let bind_addr = format!("{host}:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid {
                var: "HOST",
                value: host,
            })?;

        Ok(Self {
            bind_addr,
            data_dir: env_or("DATA_DIR", "market_data".to_string())?,
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| ConfigError::Missing("JWT_SECRET"))?,
            token_ttl_days: env_or("JWT_EXPIRES_DAYS", 7)?,
            bcrypt_cost: env_or("BCRYPT_COST", 12)?,
            allow_duplicate_owners: env_or("ALLOW_DUPLICATE_OWNERSHIP", true)?,
            starting_balance: env_opt("STARTING_BALANCE")?,
            cookie_secure: env_or("COOKIE_SECURE", false)?,
        })
    }
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_opt<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(None),
    }
}
