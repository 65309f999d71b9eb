//! Pass and view-record ledger.
//!
//! The ledger store offers single-row reads and writes plus a uniqueness
//! constraint on view records. Stores with multi-row transactions (the
//! `PostgreSQL` adapter in [`crate::db`]) also implement
//! [`LedgerStore::unlock_and_charge`], and [`EntitlementService`] uses it to
//! commit the unlock and the charge together. Other stores (the default
//! [`MemoryLedger`]) get the insert-then-charge protocol, where the
//! uniqueness constraint alone guarantees at most one charge per listing.

mod error;
mod memory;
mod service;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warehub_core::{
    ItemType, Listing, ListingId, Pass, PassGrant, PassId, UsageEntry, UserId, ViewKey, ViewRecord,
};

use crate::db::RepositoryError;

pub use error::ConsumeError;
pub use memory::{InsertFault, MemoryLedger, MemoryListings};
pub use service::{
    Access, AuditReport, ConsumeOutcome, EntitlementService, LedgerSettings, PassSummary,
};

/// Result of an optimistic charge against a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeResult {
    /// The credit was deducted.
    Charged {
        /// Balance after the deduction.
        remaining_count: i32,
    },
    /// No row matched the expected version with a positive balance.
    Stale,
}

/// Result of a transactional unlock-and-charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockResult {
    /// The view record and the deduction were committed together.
    Charged {
        view: ViewRecord,
        remaining_count: i32,
    },
    /// A view record already existed; nothing was written.
    AlreadyUnlocked,
    /// The pass had no credit left; nothing was written.
    Exhausted,
}

/// Data-access layer for passes and view records.
///
/// Every method is a single atomic operation. Only
/// [`LedgerStore::unlock_and_charge`] spans rows, and only on stores that
/// support it. Validation (expiry, balance, already-viewed) lives in
/// [`EntitlementService`].
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Look up a user's pass.
    async fn find_pass(&self, user_id: UserId) -> Result<Option<Pass>, RepositoryError>;

    /// Look up a pass by its row identity.
    async fn find_pass_by_id(&self, pass_id: PassId) -> Result<Option<Pass>, RepositoryError>;

    /// Whether a view record exists for `key`.
    async fn has_view_record(&self, key: ViewKey) -> Result<bool, RepositoryError>;

    /// Insert a view record.
    ///
    /// Returns [`RepositoryError::Conflict`] if one already exists for `key`.
    async fn insert_view_record(
        &self,
        key: ViewKey,
        viewed_at: DateTime<Utc>,
    ) -> Result<ViewRecord, RepositoryError>;

    /// Deduct one credit and append `entry` to the usage history.
    ///
    /// Applies only if the pass still has `expected_version` and a positive
    /// balance; otherwise returns [`ChargeResult::Stale`] without writing.
    /// Charges do not bump the version, so concurrent charges never
    /// invalidate each other; purchases and extensions do.
    async fn charge_pass(
        &self,
        pass_id: PassId,
        expected_version: i32,
        entry: &UsageEntry,
    ) -> Result<ChargeResult, RepositoryError>;

    /// Insert the view record for `key` and deduct one credit from `pass_id`
    /// in one transaction, appending `entry` to the usage history.
    ///
    /// The record's `viewed_at` is `entry.used_at`. Either both writes
    /// commit or neither does. Returns `None` if the store has no
    /// multi-row transactions; the caller then falls back to
    /// [`Self::insert_view_record`] followed by [`Self::charge_pass`].
    async fn unlock_and_charge(
        &self,
        _key: ViewKey,
        _pass_id: PassId,
        _entry: &UsageEntry,
    ) -> Result<Option<UnlockResult>, RepositoryError> {
        Ok(None)
    }

    /// Create or replace a user's pass. Keeps the existing usage history.
    async fn upsert_pass(&self, user_id: UserId, grant: PassGrant)
    -> Result<Pass, RepositoryError>;

    /// Move a pass's expiry.
    ///
    /// Returns [`RepositoryError::NotFound`] if the pass does not exist.
    async fn extend_pass(
        &self,
        pass_id: PassId,
        expires_at: DateTime<Utc>,
    ) -> Result<Pass, RepositoryError>;

    /// A user's view records, newest first.
    async fn list_views(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> Result<Vec<ViewRecord>, RepositoryError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Read access to listings owned by the listing service.
#[async_trait]
pub trait ListingDirectory: Send + Sync {
    /// Look up a listing by kind and ID.
    async fn find_listing(
        &self,
        item_type: ItemType,
        id: ListingId,
    ) -> Result<Option<Listing>, RepositoryError>;
}
