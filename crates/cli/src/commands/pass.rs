//! Viewing pass administration.
//!
//! Grants stand in for the purchase flow, which lives outside this service.

use chrono::{Months, Utc};

use warehub_core::{PassGrant, UserId};
use warehub_server::db::RepositoryError;

use super::{CommandError, entitlements, print_json};

/// Create or replace a user's pass with `count` credits valid for `months`.
///
/// # Errors
///
/// Returns `CommandError` if the arguments are invalid or the write fails.
pub async fn grant(user: UserId, count: i32, months: u32) -> Result<(), CommandError> {
    let expires_at = Utc::now()
        .checked_add_months(Months::new(months))
        .ok_or_else(|| CommandError::InvalidArgument(format!("{months} months is out of range")))?;

    let service = entitlements().await?;
    let pass = service
        .grant_pass(user, PassGrant { count, expires_at })
        .await?;

    tracing::info!(pass_id = %pass.id, "Pass granted");
    print_json(&pass)
}

/// Extend a user's pass by `months`.
///
/// # Errors
///
/// Returns `CommandError::NoPass` if the user has no pass.
pub async fn extend(user: UserId, months: u32) -> Result<(), CommandError> {
    let service = entitlements().await?;
    let pass = service
        .extend_pass(user, months)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => CommandError::NoPass(user),
            other => other.into(),
        })?;

    tracing::info!(pass_id = %pass.id, expires_at = %pass.expires_at, "Pass extended");
    print_json(&pass)
}

/// Print a user's pass summary.
///
/// # Errors
///
/// Returns `CommandError::NoPass` if the user has no pass.
pub async fn show(user: UserId) -> Result<(), CommandError> {
    let service = entitlements().await?;
    let summary = service
        .pass_summary(user)
        .await?
        .ok_or(CommandError::NoPass(user))?;

    print_json(&summary)
}
