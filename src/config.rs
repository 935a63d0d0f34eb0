//! Application configuration
//!
//! Everything security-relevant is read from the environment (after loading
//! `.env`). The signing secret has no fallback; the remaining values fall
//! back to the defaults below and are validated before use.

use crate::auth::tracker::LockoutPolicy;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 3600;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOCKOUT_SECS: u64 = 15 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("JWT_SECRET must be at least 32 bytes")]
    WeakSecret,
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
}

/// Optional admin account created on first start
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub clock_skew: Duration,
    pub lockout: LockoutPolicy,
    pub sweep_interval: Duration,
    pub auth_db_path: String,
    pub port: u16,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let token_ttl = Duration::from_secs(parse_or(&lookup, "JWT_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?);
        let clock_skew = Duration::from_secs(parse_or(&lookup, "JWT_CLOCK_SKEW_SECS", 0)?);
        let max_attempts = parse_or(&lookup, "LOGIN_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        let lockout_duration =
            Duration::from_secs(parse_or(&lookup, "LOGIN_LOCKOUT_SECS", DEFAULT_LOCKOUT_SECS)?);
        let sweep_interval = Duration::from_secs(parse_or(
            &lookup,
            "LOGIN_SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        )?);

        let auth_db_path = lookup("AUTH_DB_PATH").unwrap_or_else(|| "./gymdesk_auth.db".to_string());
        let port = parse_or(&lookup, "PORT", 8080)?;

        let bootstrap_admin = match (
            lookup("BOOTSTRAP_ADMIN_USERNAME"),
            lookup("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(BootstrapAdmin { username, password }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("BOOTSTRAP_ADMIN_USERNAME")),
        };

        let config = Self {
            jwt_secret,
            token_ttl,
            clock_skew,
            lockout: LockoutPolicy::new(max_attempts, lockout_duration),
            sweep_interval,
            auth_db_path,
            port,
            bootstrap_admin,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        if self.token_ttl.as_secs() == 0 {
            return Err(ConfigError::NotPositive("JWT_TTL_SECS"));
        }
        if self.lockout.max_attempts == 0 {
            return Err(ConfigError::NotPositive("LOGIN_MAX_ATTEMPTS"));
        }
        if self.lockout.lockout_duration.is_zero() {
            return Err(ConfigError::NotPositive("LOGIN_LOCKOUT_SECS"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::NotPositive("LOGIN_SWEEP_INTERVAL_SECS"));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
