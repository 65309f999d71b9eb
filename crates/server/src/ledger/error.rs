//! Consume error types.

use thiserror::Error;

use warehub_core::{FailureReason, ViewKey};

use crate::db::RepositoryError;

/// Errors that can end a consume call.
#[derive(Debug, Error)]
pub enum ConsumeError {
    /// No acting user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The user has no pass.
    #[error("no viewing pass")]
    NoPass,

    /// The pass expired.
    #[error("viewing pass expired")]
    PassExpired,

    /// The pass has no credits left.
    #[error("viewing pass exhausted")]
    PassExhausted,

    /// The store failed before the unlock was confirmed; safe to retry.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] RepositoryError),

    /// The insert reported success but the record is not visible.
    #[error("view record not visible after insert")]
    UnlockNotConfirmed,

    /// The unlock is durable but the credit could not be deducted.
    ///
    /// Never retried as a charge: re-running consume resolves to
    /// already-viewed.
    #[error("charge lost after unlock of {item_type} {item_id}: {detail}", item_type = .key.item_type, item_id = .key.item_id)]
    ChargeLostAfterUnlock {
        /// The unlocked listing.
        key: ViewKey,
        /// What went wrong with the charge.
        detail: String,
    },
}

impl ConsumeError {
    /// The client-facing failure reason.
    #[must_use]
    pub const fn reason(&self) -> FailureReason {
        match self {
            Self::NotAuthenticated => FailureReason::NotAuthenticated,
            Self::NoPass => FailureReason::NoPass,
            Self::PassExpired => FailureReason::PassExpired,
            Self::PassExhausted => FailureReason::PassExhausted,
            Self::StoreUnavailable(_) | Self::UnlockNotConfirmed => FailureReason::StoreUnavailable,
            Self::ChargeLostAfterUnlock { .. } => FailureReason::ChargeLostAfterUnlock,
        }
    }

    /// Whether the whole consume call may be retried from scratch.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable(_) | Self::UnlockNotConfirmed | Self::ChargeLostAfterUnlock { .. }
        )
    }
}
