//! CLI subcommands.

pub mod audit;
pub mod migrate;
pub mod pass;

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use thiserror::Error;

use warehub_server::db::{PgLedger, RepositoryError};
use warehub_server::ledger::{EntitlementService, LedgerSettings};

/// Errors shared by the CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Ledger operation failed.
    #[error("Ledger error: {0}")]
    Repository(#[from] RepositoryError),

    /// The user has no pass.
    #[error("No viewing pass for user {0}")]
    NoPass(warehub_core::UserId),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be serialized.
    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}

/// Database URL from `WAREHUB_DATABASE_URL`, falling back to `DATABASE_URL`.
fn database_url() -> Result<SecretString, CommandError> {
    dotenvy::dotenv().ok();

    std::env::var("WAREHUB_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("WAREHUB_DATABASE_URL"))
}

async fn connect() -> Result<PgPool, CommandError> {
    let database_url = database_url()?;
    tracing::info!("Connecting to database...");
    Ok(PgPool::connect(database_url.expose_secret()).await?)
}

/// Entitlement service over the configured database.
async fn entitlements() -> Result<EntitlementService, CommandError> {
    let pool = connect().await?;
    Ok(EntitlementService::new(
        Arc::new(PgLedger::new(pool)),
        LedgerSettings::default(),
    ))
}

/// Print a value as pretty JSON on stdout.
fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CommandError> {
    let output = serde_json::to_string_pretty(value)?;
    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}
