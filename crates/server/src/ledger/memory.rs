//! In-memory ledger backend.
//!
//! Single-row atomicity, a uniqueness constraint on view records and
//! versioned pass updates. Every operation yields to the scheduler so that
//! concurrent consume calls really interleave. Fault hooks reproduce the
//! store misbehaviour the consume protocol has to survive.
//!
//! [`MemoryLedger::new`] has no multi-row transactions and exercises the
//! insert-then-charge path. [`MemoryLedger::transactional`] commits unlock
//! and charge together, like the `PostgreSQL` store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use warehub_core::{
    ItemType, Listing, ListingId, Pass, PassGrant, PassId, UsageEntry, UserId, ViewKey,
    ViewRecord, ViewRecordId,
};

use super::{ChargeResult, LedgerStore, ListingDirectory, UnlockResult};
use crate::db::RepositoryError;

/// How the next view-record insert should misbehave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertFault {
    /// Fail without writing anything.
    Reject,
    /// Write the row, then report an error anyway.
    CommitThenError,
}

#[derive(Debug, Default)]
struct Faults {
    insert: Option<InsertFault>,
    hidden_view_reads: u32,
    fail_view_reads: bool,
    fail_pass_reads: bool,
    fail_next_charge: bool,
    racing_writes: u32,
}

#[derive(Debug, Default)]
struct State {
    passes: HashMap<PassId, Pass>,
    views: HashMap<ViewKey, ViewRecord>,
    charges: u64,
    faults: Faults,
}

impl State {
    fn pass_for(&self, user_id: UserId) -> Option<&Pass> {
        self.passes.values().find(|pass| pass.user_id == user_id)
    }
}

/// In-memory [`LedgerStore`].
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    transactional: bool,
}

fn unavailable() -> RepositoryError {
    RepositoryError::Database(sqlx::Error::PoolTimedOut)
}

impl MemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty ledger that supports
    /// [`LedgerStore::unlock_and_charge`].
    #[must_use]
    pub fn transactional() -> Self {
        Self {
            transactional: true,
            ..Self::default()
        }
    }

    /// Store a pass as-is, replacing any pass the same user had.
    pub async fn put_pass(&self, pass: Pass) {
        let mut state = self.state.lock().await;
        state.passes.retain(|_, existing| existing.user_id != pass.user_id);
        state.passes.insert(pass.id, pass);
    }

    /// Number of successful charges so far.
    pub async fn charge_count(&self) -> u64 {
        self.state.lock().await.charges
    }

    /// Number of view records stored.
    pub async fn view_count(&self) -> usize {
        self.state.lock().await.views.len()
    }

    /// Make the next view-record insert misbehave.
    pub async fn fail_next_insert(&self, fault: InsertFault) {
        self.state.lock().await.faults.insert = Some(fault);
    }

    /// Report the next `reads` existence checks as absent even if the row exists.
    pub async fn hide_view_reads(&self, reads: u32) {
        self.state.lock().await.faults.hidden_view_reads = reads;
    }

    /// Fail every view-record existence check until cleared.
    pub async fn set_view_reads_failing(&self, failing: bool) {
        self.state.lock().await.faults.fail_view_reads = failing;
    }

    /// Fail every pass read until cleared.
    pub async fn set_pass_reads_failing(&self, failing: bool) {
        self.state.lock().await.faults.fail_pass_reads = failing;
    }

    /// Fail the next charge (or unlock-and-charge) with a store error.
    pub async fn fail_next_charge(&self) {
        self.state.lock().await.faults.fail_next_charge = true;
    }

    /// Simulate `writes` racing pass updates (e.g. extensions) landing just
    /// before the next charges, bumping the version out from under them.
    pub async fn race_next_charges(&self, writes: u32) {
        self.state.lock().await.faults.racing_writes = writes;
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn find_pass(&self, user_id: UserId) -> Result<Option<Pass>, RepositoryError> {
        tokio::task::yield_now().await;
        let state = self.state.lock().await;
        if state.faults.fail_pass_reads {
            return Err(unavailable());
        }
        Ok(state.pass_for(user_id).cloned())
    }

    async fn find_pass_by_id(&self, pass_id: PassId) -> Result<Option<Pass>, RepositoryError> {
        tokio::task::yield_now().await;
        let state = self.state.lock().await;
        if state.faults.fail_pass_reads {
            return Err(unavailable());
        }
        Ok(state.passes.get(&pass_id).cloned())
    }

    async fn has_view_record(&self, key: ViewKey) -> Result<bool, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        if state.faults.fail_view_reads {
            return Err(unavailable());
        }
        if state.faults.hidden_view_reads > 0 {
            state.faults.hidden_view_reads -= 1;
            return Ok(false);
        }
        Ok(state.views.contains_key(&key))
    }

    async fn insert_view_record(
        &self,
        key: ViewKey,
        viewed_at: DateTime<Utc>,
    ) -> Result<ViewRecord, RepositoryError> {
        tokio::task::yield_now().await;
        let result = {
            let mut state = self.state.lock().await;
            let fault = state.faults.insert.take();

            if fault == Some(InsertFault::Reject) {
                Err(unavailable())
            } else if state.views.contains_key(&key) {
                Err(RepositoryError::Conflict("view record already exists".to_owned()))
            } else {
                let record = ViewRecord {
                    id: ViewRecordId::generate(),
                    user_id: key.user_id,
                    item_id: key.item_id,
                    item_type: key.item_type,
                    viewed_at,
                };
                state.views.insert(key, record.clone());

                if fault == Some(InsertFault::CommitThenError) {
                    Err(unavailable())
                } else {
                    Ok(record)
                }
            }
        };
        tokio::task::yield_now().await;
        result
    }

    async fn charge_pass(
        &self,
        pass_id: PassId,
        expected_version: i32,
        entry: &UsageEntry,
    ) -> Result<ChargeResult, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;

        if state.faults.fail_next_charge {
            state.faults.fail_next_charge = false;
            return Err(unavailable());
        }

        if state.faults.racing_writes > 0 {
            state.faults.racing_writes -= 1;
            if let Some(pass) = state.passes.get_mut(&pass_id) {
                pass.version += 1;
            }
        }

        let Some(pass) = state.passes.get_mut(&pass_id) else {
            return Ok(ChargeResult::Stale);
        };
        if pass.version != expected_version || pass.remaining_count <= 0 {
            return Ok(ChargeResult::Stale);
        }

        pass.remaining_count -= 1;
        pass.used_history.push(entry.clone());
        let remaining_count = pass.remaining_count;
        state.charges += 1;

        Ok(ChargeResult::Charged { remaining_count })
    }

    async fn unlock_and_charge(
        &self,
        key: ViewKey,
        pass_id: PassId,
        entry: &UsageEntry,
    ) -> Result<Option<UnlockResult>, RepositoryError> {
        if !self.transactional {
            return Ok(None);
        }

        tokio::task::yield_now().await;
        let result = {
            let mut state = self.state.lock().await;

            if state.faults.fail_next_charge {
                state.faults.fail_next_charge = false;
                return Err(unavailable());
            }
            if state.views.contains_key(&key) {
                return Ok(Some(UnlockResult::AlreadyUnlocked));
            }

            let Some(pass) = state.passes.get_mut(&pass_id) else {
                return Ok(Some(UnlockResult::Exhausted));
            };
            if pass.remaining_count <= 0 {
                return Ok(Some(UnlockResult::Exhausted));
            }
            pass.remaining_count -= 1;
            pass.used_history.push(entry.clone());
            let remaining_count = pass.remaining_count;

            let view = ViewRecord {
                id: ViewRecordId::generate(),
                user_id: key.user_id,
                item_id: key.item_id,
                item_type: key.item_type,
                viewed_at: entry.used_at,
            };
            state.views.insert(key, view.clone());
            state.charges += 1;

            UnlockResult::Charged {
                view,
                remaining_count,
            }
        };
        tokio::task::yield_now().await;
        Ok(Some(result))
    }

    async fn upsert_pass(
        &self,
        user_id: UserId,
        grant: PassGrant,
    ) -> Result<Pass, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;

        let pass = match state.passes.values_mut().find(|p| p.user_id == user_id) {
            Some(existing) => {
                existing.remaining_count = grant.count;
                existing.total_count = grant.count;
                existing.expires_at = grant.expires_at;
                existing.version += 1;
                existing.clone()
            }
            None => {
                let pass = Pass {
                    id: PassId::generate(),
                    user_id,
                    remaining_count: grant.count,
                    total_count: grant.count,
                    expires_at: grant.expires_at,
                    used_history: Vec::new(),
                    version: 0,
                };
                state.passes.insert(pass.id, pass.clone());
                pass
            }
        };

        Ok(pass)
    }

    async fn extend_pass(
        &self,
        pass_id: PassId,
        expires_at: DateTime<Utc>,
    ) -> Result<Pass, RepositoryError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().await;
        let pass = state
            .passes
            .get_mut(&pass_id)
            .ok_or(RepositoryError::NotFound)?;
        pass.expires_at = expires_at;
        pass.version += 1;
        Ok(pass.clone())
    }

    async fn list_views(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> Result<Vec<ViewRecord>, RepositoryError> {
        tokio::task::yield_now().await;
        let state = self.state.lock().await;
        let mut views: Vec<ViewRecord> = state
            .views
            .values()
            .filter(|view| view.user_id == user_id)
            .cloned()
            .collect();
        views.sort_by(|a, b| b.viewed_at.cmp(&a.viewed_at));
        if let Some(limit) = limit {
            views.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        Ok(views)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

/// In-memory [`ListingDirectory`].
#[derive(Debug, Default)]
pub struct MemoryListings {
    listings: Mutex<HashMap<(ItemType, ListingId), Listing>>,
    failing: AtomicBool,
}

impl MemoryListings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a listing.
    pub async fn insert(&self, listing: Listing) {
        self.listings
            .lock()
            .await
            .insert((listing.item_type(), listing.id()), listing);
    }

    /// Fail every lookup until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ListingDirectory for MemoryListings {
    async fn find_listing(
        &self,
        item_type: ItemType,
        id: ListingId,
    ) -> Result<Option<Listing>, RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.listings.lock().await.get(&(item_type, id)).cloned())
    }
}
