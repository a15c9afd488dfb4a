//! Environment-driven runtime configuration.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

use academia_auth::LockoutPolicy;
use academia_infra::TokenConfig;
use academia_observability::LogFormat;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Super-admin created at startup when its email is unknown.
#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub bcrypt_cost: u32,
    pub lockout: LockoutPolicy,
    pub log_format: LogFormat,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("environment", &self.environment)
            .field("bind_addr", &self.bind_addr)
            .field("database", &self.database_url.is_some())
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("lockout", &self.lockout)
            .field("log_format", &self.log_format)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .finish_non_exhaustive()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_refresh_secret: DEV_JWT_SECRET.to_string(),
            access_ttl: Duration::hours(24),
            refresh_ttl: Duration::days(7),
            environment: Environment::Development,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            bcrypt_cost: 12,
            lockout: LockoutPolicy::default(),
            log_format: LogFormat::Json,
            bootstrap_admin: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let jwt_secret = var("JWT_SECRET").unwrap_or(defaults.jwt_secret);
        let jwt_refresh_secret = var("JWT_REFRESH_SECRET").unwrap_or_else(|| jwt_secret.clone());

        let access_ttl = match var("ACCESS_TOKEN_TTL_SECS") {
            Some(raw) => Duration::seconds(parse_positive("ACCESS_TOKEN_TTL_SECS", &raw)?),
            None => defaults.access_ttl,
        };
        let refresh_ttl = match var("REFRESH_TOKEN_TTL_SECS") {
            Some(raw) => Duration::seconds(parse_positive("REFRESH_TOKEN_TTL_SECS", &raw)?),
            None => defaults.refresh_ttl,
        };

        let environment = match var("APP_ENV").or_else(|| var("NODE_ENV")) {
            Some(env) if env.eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        };

        let bind_addr = match var("BIND_ADDR") {
            Some(raw) => raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                var: "BIND_ADDR",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.bind_addr,
        };

        let bcrypt_cost = match var("BCRYPT_COST") {
            Some(raw) => {
                let cost = parse_positive("BCRYPT_COST", &raw)?;
                u32::try_from(cost)
                    .ok()
                    .filter(|c| (4..=31).contains(c))
                    .ok_or_else(|| ConfigError::Invalid {
                        var: "BCRYPT_COST",
                        value: raw.clone(),
                        reason: "must be between 4 and 31".to_string(),
                    })?
            }
            None => defaults.bcrypt_cost,
        };

        let mut lockout = defaults.lockout;
        if let Some(raw) = var("MAX_LOGIN_ATTEMPTS") {
            lockout.max_attempts = u32::try_from(parse_positive("MAX_LOGIN_ATTEMPTS", &raw)?)
                .map_err(|e| ConfigError::Invalid {
                    var: "MAX_LOGIN_ATTEMPTS",
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(raw) = var("LOCKOUT_SECS") {
            lockout.lockout = Duration::seconds(parse_positive("LOCKOUT_SECS", &raw)?);
        }

        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw.parse().map_err(|reason: String| ConfigError::Invalid {
                var: "LOG_FORMAT",
                value: raw.clone(),
                reason,
            })?,
            None => defaults.log_format,
        };

        let bootstrap_admin = match (
            var("BOOTSTRAP_SUPER_ADMIN_EMAIL"),
            var("BOOTSTRAP_SUPER_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            jwt_secret,
            jwt_refresh_secret,
            access_ttl,
            refresh_ttl,
            environment,
            bind_addr,
            database_url: var("DATABASE_URL"),
            bcrypt_cost,
            lockout,
            log_format,
            bootstrap_admin,
        })
    }

    /// Log format alone, for installing the subscriber before the rest of the
    /// configuration is read. Invalid values fall back to the default here and
    /// are reported by [`AppConfig::from_env`].
    pub fn log_format_from_env() -> LogFormat {
        std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// True when either signing secret is the built-in development value.
    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET || self.jwt_refresh_secret == DEV_JWT_SECRET
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig {
            access_secret: self.jwt_secret.clone(),
            refresh_secret: self.jwt_refresh_secret.clone(),
            access_ttl: self.access_ttl,
            refresh_ttl: self.refresh_ttl,
        }
    }

    /// Cookies carry the `Secure` attribute only in production.
    pub fn secure_cookies(&self) -> bool {
        self.environment.is_production()
    }
}

fn parse_positive(var: &'static str, raw: &str) -> Result<i64, ConfigError> {
    match raw.parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: "must be positive".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}
