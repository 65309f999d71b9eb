//! Entitlement evaluation.
//!
//! Decides whether opening a listing's details is free (already unlocked),
//! blocked (no usable pass), or would consume one pass credit.
//!
//! The already-viewed check always wins over every pass-state check: a listing
//! that was unlocked once stays viewable forever, even after the pass expires,
//! runs out, or is deleted.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Pass;

/// Default number of days before expiry at which users are warned.
pub const DEFAULT_EXPIRY_WARNING_DAYS: i64 = 7;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Result of evaluating a user's entitlement to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// A view record exists; opening the listing costs nothing.
    AlreadyViewed,
    /// The user has no pass.
    NoPass,
    /// The pass expired.
    Expired,
    /// The pass has no credits left.
    Exhausted,
    /// Opening the listing would consume one credit.
    Grant,
}

/// Prompt the client should show before opening a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Open directly, no pricing UI.
    Open,
    /// Ask for confirmation before spending a credit.
    ConfirmUse,
    /// Route to the purchase flow.
    Purchase,
    /// Route to the renewal flow.
    Renew,
}

impl Decision {
    /// Whether the listing may be opened without further payment steps.
    #[must_use]
    pub const fn allows_view(self) -> bool {
        matches!(self, Self::AlreadyViewed | Self::Grant)
    }

    /// The prompt matching this decision.
    #[must_use]
    pub const fn prompt(self) -> Prompt {
        match self {
            Self::AlreadyViewed => Prompt::Open,
            Self::Grant => Prompt::ConfirmUse,
            Self::NoPass | Self::Exhausted => Prompt::Purchase,
            Self::Expired => Prompt::Renew,
        }
    }
}

/// Evaluate a user's entitlement to a listing.
///
/// # Arguments
///
/// * `pass` - The user's current pass, if any
/// * `has_view_record` - Whether the user already unlocked the listing
/// * `now` - Evaluation time
#[must_use]
pub fn evaluate(pass: Option<&Pass>, has_view_record: bool, now: DateTime<Utc>) -> Decision {
    if has_view_record {
        return Decision::AlreadyViewed;
    }

    let Some(pass) = pass else {
        return Decision::NoPass;
    };

    if pass.is_expired(now) {
        Decision::Expired
    } else if pass.is_exhausted() {
        Decision::Exhausted
    } else {
        Decision::Grant
    }
}

/// Whole days until the pass expires, rounded up. Never negative.
#[must_use]
pub fn remaining_days(pass: &Pass, now: DateTime<Utc>) -> i64 {
    let seconds = (pass.expires_at - now).num_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

/// Whether the pass expires within `window_days` but has not expired yet.
#[must_use]
pub fn expiry_warning(pass: &Pass, now: DateTime<Utc>, window_days: i64) -> bool {
    let days = remaining_days(pass, now);
    days > 0 && days <= window_days
}

/// Expiry after extending by `months`.
///
/// Extensions start from the current expiry if it is still in the future,
/// otherwise from `now`. Returns `None` if the date would overflow.
#[must_use]
pub fn extended_expiry(
    current: DateTime<Utc>,
    now: DateTime<Utc>,
    months: u32,
) -> Option<DateTime<Utc>> {
    current.max(now).checked_add_months(Months::new(months))
}
