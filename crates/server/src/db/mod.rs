//! Database operations for the Warehub `PostgreSQL` store.
//!
//! # Database: `warehub`
//!
//! ## Tables
//!
//! - `warehub.viewing_pass` - One pass per user (balance, expiry, usage history)
//! - `warehub.item_view` - Permanent unlock records, unique per (user, item, type)
//! - `warehub.warehouse` / `warehub.customer` - Listing projections (read-only here)
//! - `tower_sessions.session` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p warehub-cli -- migrate
//! ```

pub mod ledger;
pub mod listings;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use ledger::PgLedger;
pub use listings::PgListings;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., a view record for the same user and item).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a sqlx error, turning unique violations into `Conflict`.
    pub(crate) fn from_insert(e: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(format!("{what} already exists"));
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
