//! Ledger audit.
//!
//! Lists a user's unlocks that have no matching entry in the pass usage
//! history, e.g. after a charge was lost following a durable unlock. The
//! report is informational; balances are never adjusted.

use warehub_core::UserId;

use super::{CommandError, entitlements, print_json};

/// Audit a user's ledger and print the report.
///
/// # Errors
///
/// Returns `CommandError` if the ledger cannot be read.
pub async fn run(user: UserId) -> Result<(), CommandError> {
    let service = entitlements().await?;
    let report = service.audit(user).await?;

    if !report.is_consistent() {
        tracing::warn!(
            uncharged = report.uncharged.len(),
            "Found unlocks without a recorded charge"
        );
    }

    print_json(&report)
}
