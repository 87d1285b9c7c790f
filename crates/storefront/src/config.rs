//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CARTSYNC_DATABASE_URL` - `PostgreSQL` connection string for the account
//!   store (falls back to `DATABASE_URL`; absent means offline)
//! - `CARTSYNC_STORE_DIR` - Directory for the local key-value store
//!   (default: `.cartsync`)
//! - `CARTSYNC_IDENTITY_TIMEOUT_SECS` - Upper bound on the initial identity
//!   check, 1-60 (default: 5)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const DEFAULT_STORE_DIR: &str = ".cartsync";
const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 5;
const MAX_IDENTITY_TIMEOUT_SECS: u64 = 60;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Engine configuration.
#[derive(Clone)]
pub struct SyncConfig {
    /// `PostgreSQL` connection URL for the account store (contains password)
    pub database_url: Option<SecretString>,
    /// Directory backing the local key-value store
    pub store_dir: PathBuf,
    /// How long to wait for the first identity decision before treating the
    /// visitor as anonymous
    pub identity_timeout: Duration,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("store_dir", &self.store_dir)
            .field("identity_timeout", &self.identity_timeout)
            .field("sentry_dsn", &self.sentry_dsn)
            .field("sentry_environment", &self.sentry_environment)
            .finish()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            identity_timeout: Duration::from_secs(DEFAULT_IDENTITY_TIMEOUT_SECS),
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("CARTSYNC_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .filter(|url| !url.trim().is_empty())
            .map(SecretString::from);

        let store_dir = lookup("CARTSYNC_STORE_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STORE_DIR), PathBuf::from);

        let identity_timeout = match lookup("CARTSYNC_IDENTITY_TIMEOUT_SECS") {
            Some(raw) => parse_identity_timeout(&raw)?,
            None => Duration::from_secs(DEFAULT_IDENTITY_TIMEOUT_SECS),
        };

        Ok(Self {
            database_url,
            store_dir,
            identity_timeout,
            sentry_dsn: lookup("SENTRY_DSN"),
            sentry_environment: lookup("SENTRY_ENVIRONMENT"),
        })
    }

    /// Database URL, or an error naming the variable to set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if no database is configured.
    pub fn require_database_url(&self) -> Result<&SecretString, ConfigError> {
        self.database_url
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("CARTSYNC_DATABASE_URL".to_string()))
    }
}

fn parse_identity_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let secs = raw.trim().parse::<u64>().map_err(|e| {
        ConfigError::InvalidEnvVar("CARTSYNC_IDENTITY_TIMEOUT_SECS".to_string(), e.to_string())
    })?;
    if secs == 0 || secs > MAX_IDENTITY_TIMEOUT_SECS {
        return Err(ConfigError::InvalidEnvVar(
            "CARTSYNC_IDENTITY_TIMEOUT_SECS".to_string(),
            format!("must be between 1 and {MAX_IDENTITY_TIMEOUT_SECS} (got {secs})"),
        ));
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<SyncConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SyncConfig::from_vars(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert!(config.database_url.is_none());
        assert_eq!(config.store_dir, PathBuf::from(".cartsync"));
        assert_eq!(config.identity_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_database_url_fallback() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/fallback")]).unwrap();
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://localhost/fallback"
        );

        let config = load(&[
            ("CARTSYNC_DATABASE_URL", "postgres://localhost/primary"),
            ("DATABASE_URL", "postgres://localhost/fallback"),
        ])
        .unwrap();
        assert_eq!(
            config.database_url.unwrap().expose_secret(),
            "postgres://localhost/primary"
        );
    }

    #[test]
    fn test_identity_timeout_bounds() {
        assert!(load(&[("CARTSYNC_IDENTITY_TIMEOUT_SECS", "0")]).is_err());
        assert!(load(&[("CARTSYNC_IDENTITY_TIMEOUT_SECS", "61")]).is_err());
        assert!(load(&[("CARTSYNC_IDENTITY_TIMEOUT_SECS", "soon")]).is_err());

        let config = load(&[("CARTSYNC_IDENTITY_TIMEOUT_SECS", "3")]).unwrap();
        assert_eq!(config.identity_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_require_database_url() {
        let config = load(&[]).unwrap();
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = load(&[("CARTSYNC_DATABASE_URL", "postgres://user:hunter2@db/cart")]).unwrap();
        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
    }
}
