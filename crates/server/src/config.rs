//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `WAREHUB_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `WAREHUB_BASE_URL` - Public URL of the API
//! - `WAREHUB_SESSION_SECRET` - Session cookie signing secret (min 64 chars, high entropy)
//!
//! ## Optional
//! - `WAREHUB_HOST` - Bind address (default: 127.0.0.1)
//! - `WAREHUB_PORT` - Listen port (default: 3000)
//! - `WAREHUB_CHARGE_ATTEMPTS` - Charge attempts when the pass changes concurrently (default: 3)
//! - `WAREHUB_EXPIRY_WARNING_DAYS` - Days before expiry to flag a pass (default: 7)
//! - `WAREHUB_RECENT_VIEWS_LIMIT` - Default size of the recent-views list (default: 10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tower_sessions::cookie::Key;

use crate::ledger::LedgerSettings;

const MIN_SESSION_SECRET_LENGTH: usize = 64;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct WarehubConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Entitlement service tunables
    pub ledger: LedgerSettings,
    /// Default number of entries in the recent-views list
    pub recent_views_limit: i64,
    /// Sentry error tracking
    pub sentry: SentryConfig,
}

/// Sentry options.
#[derive(Debug, Clone, PartialEq)]
pub struct SentryConfig {
    pub dsn: Option<String>,
    pub environment: Option<String>,
    pub sample_rate: f32,
    pub traces_sample_rate: f32,
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            environment: None,
            sample_rate: 1.0,
            traces_sample_rate: 0.0,
        }
    }
}

impl WarehubConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("WAREHUB_DATABASE_URL")?;
        let host = get_parsed_or_default("WAREHUB_HOST", "127.0.0.1")?;
        let port = get_parsed_or_default("WAREHUB_PORT", "3000")?;
        let base_url = get_required_env("WAREHUB_BASE_URL")?;
        let session_secret = get_validated_secret("WAREHUB_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "WAREHUB_SESSION_SECRET")?;

        let charge_attempts: u32 = get_parsed_or_default("WAREHUB_CHARGE_ATTEMPTS", "3")?;
        if charge_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "WAREHUB_CHARGE_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let ledger = LedgerSettings {
            charge_attempts,
            expiry_warning_days: get_parsed_or_default("WAREHUB_EXPIRY_WARNING_DAYS", "7")?,
        };
        let recent_views_limit = get_parsed_or_default("WAREHUB_RECENT_VIEWS_LIMIT", "10")?;

        let sentry = SentryConfig {
            dsn: get_optional_env("SENTRY_DSN"),
            environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sample_rate: get_parsed_or_default("SENTRY_SAMPLE_RATE", "1.0")?,
            traces_sample_rate: get_parsed_or_default("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        };

        let config = Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            ledger,
            recent_views_limit,
            sentry,
        };
        config.session_key()?;

        Ok(config)
    }

    /// Key for signing session cookies, taken from the session secret.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InsecureSecret` if the secret is too short to
    /// form a key.
    pub fn session_key(&self) -> Result<Key, ConfigError> {
        Key::try_from(self.session_secret.expose_secret().as_bytes()).map_err(|e| {
            ConfigError::InsecureSecret("WAREHUB_SESSION_SECRET".to_string(), e.to_string())
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn get_parsed_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
