//! Entitlement service: the consume protocol and everything that reads the
//! ledger on behalf of the API.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use warehub_core::entitlement::{self, DEFAULT_EXPIRY_WARNING_DAYS};
use warehub_core::usage::{self, UsageStatistics};
use warehub_core::{
    ConsumeReport, Decision, ItemType, Listing, ListingId, Pass, PassGrant, PassId, UsageEntry,
    UserId, ViewKey, ViewRecord, evaluate, resolve_name,
};

use super::{ChargeResult, ConsumeError, LedgerStore, UnlockResult};
use crate::db::RepositoryError;
use crate::models::Actor;

/// Tunables for the entitlement service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// How many times a charge is attempted when the pass version moved
    /// underneath it.
    pub charge_attempts: u32,
    /// Days before expiry at which the pass summary flags a warning.
    pub expiry_warning_days: i64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            charge_attempts: 3,
            expiry_warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
        }
    }
}

/// Successful consume results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// This call created the view record and deducted one credit.
    Charged {
        remaining_count: i32,
        view: ViewRecord,
    },
    /// The listing was already unlocked; nothing was charged.
    AlreadyViewed,
}

impl ConsumeOutcome {
    /// Wire report for a consume result.
    #[must_use]
    pub fn report(result: &Result<Self, ConsumeError>) -> ConsumeReport {
        match result {
            Ok(Self::Charged {
                remaining_count, ..
            }) => ConsumeReport::charged(*remaining_count),
            Ok(Self::AlreadyViewed) => ConsumeReport::already_viewed(),
            Err(err) => ConsumeReport::failed(err.reason()),
        }
    }
}

/// Why an actor may or may not open a listing's details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Administrative override.
    Privileged,
    /// The actor owns the listing.
    Owner,
    /// The actor holds a view record.
    Unlocked,
    /// The actor must consume a pass credit first.
    Locked,
    /// No acting user.
    Unauthenticated,
}

impl Access {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Privileged | Self::Owner | Self::Unlocked)
    }
}

/// A user's pass as shown on their account page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub pass_id: PassId,
    pub remaining_count: i32,
    pub total_count: i32,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub remaining_days: i64,
    pub expiring_soon: bool,
}

/// Discrepancy between a user's unlocks and their charged usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub user_id: UserId,
    pub pass_id: Option<PassId>,
    pub view_count: usize,
    pub charged_count: usize,
    /// Unlocks with no charge on record, oldest first.
    pub uncharged: Vec<ViewKey>,
}

impl AuditReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.uncharged.is_empty()
    }
}

/// Entitlement operations over a [`LedgerStore`].
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn LedgerStore>,
    settings: LedgerSettings,
}

impl EntitlementService {
    /// Create a new entitlement service.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, settings: LedgerSettings) -> Self {
        Self { store, settings }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    // =========================================================================
    // Consume
    // =========================================================================

    /// Spend one pass credit to unlock a listing, at most once per user.
    ///
    /// On stores with transactions the view record and the deduction commit
    /// together, so each credit unlocks exactly one listing. Otherwise the
    /// view record is written first and the pass is charged only by the call
    /// whose insert created it. Concurrent or retried calls for the same
    /// listing then charge at most once, and a failure after the record is
    /// durable loses the charge rather than repeating it.
    ///
    /// # Errors
    ///
    /// Returns `ConsumeError::NotAuthenticated` if `user_id` is `None`.
    /// Returns `ConsumeError::NoPass`, `PassExpired` or `PassExhausted` if the
    /// pass does not allow a new unlock.
    /// Returns `ConsumeError::StoreUnavailable` or `UnlockNotConfirmed` if the
    /// unlock could not be established; the call is safe to retry.
    /// Returns `ConsumeError::ChargeLostAfterUnlock` if the unlock is durable
    /// but the credit was not deducted.
    #[instrument(skip(self, item_name))]
    pub async fn consume(
        &self,
        user_id: Option<UserId>,
        item_id: ListingId,
        item_type: ItemType,
        item_name: Option<&str>,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        let user_id = user_id.ok_or(ConsumeError::NotAuthenticated)?;
        let key = ViewKey::new(user_id, item_id, item_type);

        // Already unlocked: free, no writes.
        if self
            .store
            .has_view_record(key)
            .await
            .map_err(ConsumeError::StoreUnavailable)?
        {
            tracing::debug!("listing already unlocked, not charging");
            return Ok(ConsumeOutcome::AlreadyViewed);
        }

        let pass = self
            .store
            .find_pass(user_id)
            .await
            .map_err(ConsumeError::StoreUnavailable)?;

        let pass = match (evaluate(pass.as_ref(), false, Utc::now()), pass) {
            (Decision::Grant, Some(pass)) => pass,
            (Decision::Expired, _) => return Err(ConsumeError::PassExpired),
            (Decision::Exhausted, _) => return Err(ConsumeError::PassExhausted),
            (Decision::AlreadyViewed, _) => return Ok(ConsumeOutcome::AlreadyViewed),
            (Decision::NoPass | Decision::Grant, _) => return Err(ConsumeError::NoPass),
        };

        let now = Utc::now();
        let entry = UsageEntry::single(item_id, item_type, item_name, now);

        if let Some(result) = self
            .store
            .unlock_and_charge(key, pass.id, &entry)
            .await
            .map_err(ConsumeError::StoreUnavailable)?
        {
            return match result {
                UnlockResult::Charged {
                    view,
                    remaining_count,
                } => {
                    tracing::info!(remaining_count, "viewing pass credit used");
                    Ok(ConsumeOutcome::Charged {
                        remaining_count,
                        view,
                    })
                }
                UnlockResult::AlreadyUnlocked => {
                    tracing::info!("concurrent request unlocked the listing first, not charging");
                    Ok(ConsumeOutcome::AlreadyViewed)
                }
                UnlockResult::Exhausted => Err(ConsumeError::PassExhausted),
            };
        }

        // The unique constraint decides which concurrent caller charges.
        let view = match self.store.insert_view_record(key, now).await {
            Ok(view) => view,
            Err(RepositoryError::Conflict(_)) => {
                tracing::info!("concurrent request unlocked the listing first, not charging");
                return Ok(ConsumeOutcome::AlreadyViewed);
            }
            Err(err) => return self.recover_failed_insert(key, err).await,
        };

        match self.store.has_view_record(key).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!("view record not visible after insert, not charging");
                return Err(ConsumeError::UnlockNotConfirmed);
            }
            Err(err) => {
                tracing::error!(error = %err, "could not confirm view record, not charging");
                return Err(ConsumeError::StoreUnavailable(err));
            }
        }

        let remaining_count = self.charge(pass, key, &entry).await?;

        tracing::info!(remaining_count, "viewing pass credit used");
        Ok(ConsumeOutcome::Charged {
            remaining_count,
            view,
        })
    }

    /// The insert failed for a reason other than uniqueness. It may still have
    /// committed, so check before reporting a failure.
    async fn recover_failed_insert(
        &self,
        key: ViewKey,
        err: RepositoryError,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        tracing::warn!(error = %err, "view record insert failed, re-checking");

        match self.store.has_view_record(key).await {
            Ok(true) => {
                tracing::warn!(
                    user_id = %key.user_id,
                    item_id = %key.item_id,
                    item_type = %key.item_type,
                    "view record exists despite insert error, not charging"
                );
                Ok(ConsumeOutcome::AlreadyViewed)
            }
            Ok(false) => Err(ConsumeError::StoreUnavailable(err)),
            Err(recheck) => {
                tracing::warn!(error = %recheck, "re-check after failed insert also failed");
                Err(ConsumeError::StoreUnavailable(err))
            }
        }
    }

    /// Deduct one credit from `pass`, scoped to its row identity and version.
    ///
    /// Only called once the view record is confirmed. Other charges leave the
    /// version alone, so a conflict means a purchase or extension replaced the
    /// pass, or it ran out of credit. The pass is reloaded and the charge
    /// tried again while credit remains. Store errors are not retried.
    async fn charge(
        &self,
        mut pass: Pass,
        key: ViewKey,
        entry: &UsageEntry,
    ) -> Result<i32, ConsumeError> {
        let pass_id = pass.id;
        let lost = |detail: String| {
            tracing::warn!(
                user_id = %key.user_id,
                item_id = %key.item_id,
                item_type = %key.item_type,
                pass_id = %pass_id,
                detail = %detail,
                "charge lost after unlock; listing stays unlocked"
            );
            ConsumeError::ChargeLostAfterUnlock { key, detail }
        };

        for attempt in 1..=self.settings.charge_attempts.max(1) {
            match self.store.charge_pass(pass.id, pass.version, entry).await {
                Ok(ChargeResult::Charged { remaining_count }) => return Ok(remaining_count),
                Ok(ChargeResult::Stale) => {
                    tracing::debug!(attempt, "pass changed before charge, reloading");
                }
                Err(err) => return Err(lost(format!("charge failed: {err}"))),
            }

            match self.store.find_pass_by_id(pass.id).await {
                Ok(Some(fresh)) if !fresh.is_exhausted() => pass = fresh,
                Ok(Some(_)) => return Err(lost("pass exhausted before charge".to_owned())),
                Ok(None) => return Err(lost("pass removed before charge".to_owned())),
                Err(err) => return Err(lost(format!("reload failed: {err}"))),
            }
        }

        Err(lost(format!(
            "pass kept changing after {} attempts",
            self.settings.charge_attempts
        )))
    }

    // =========================================================================
    // Read side
    // =========================================================================

    /// Whether the user unlocked a listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails.
    pub async fn has_view_record(
        &self,
        user_id: UserId,
        item_id: ListingId,
        item_type: ItemType,
    ) -> Result<bool, RepositoryError> {
        self.store
            .has_view_record(ViewKey::new(user_id, item_id, item_type))
            .await
    }

    /// Evaluate the user's entitlement to a listing without side effects.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store query fails.
    pub async fn evaluate(
        &self,
        user_id: UserId,
        item_id: ListingId,
        item_type: ItemType,
    ) -> Result<Decision, RepositoryError> {
        if self.has_view_record(user_id, item_id, item_type).await? {
            return Ok(Decision::AlreadyViewed);
        }
        let pass = self.store.find_pass(user_id).await?;
        Ok(evaluate(pass.as_ref(), false, Utc::now()))
    }

    /// Decide whether `actor` may open a listing's details.
    ///
    /// Owners and privileged actors never need a pass.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the view-record check fails.
    pub async fn check_access(
        &self,
        actor: Option<&Actor>,
        listing: &Listing,
    ) -> Result<Access, RepositoryError> {
        let Some(actor) = actor else {
            return Ok(Access::Unauthenticated);
        };
        if actor.privileged {
            return Ok(Access::Privileged);
        }
        if listing.is_owned_by(actor.user_id) {
            return Ok(Access::Owner);
        }

        let unlocked = self
            .has_view_record(actor.user_id, listing.id(), listing.item_type())
            .await?;
        Ok(if unlocked {
            Access::Unlocked
        } else {
            Access::Locked
        })
    }

    /// The name `actor` should see for a listing.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the view-record check fails.
    pub async fn display_name(
        &self,
        actor: Option<&Actor>,
        listing: &Listing,
    ) -> Result<String, RepositoryError> {
        let (privileged, unlocked) = match actor {
            None => (false, false),
            Some(actor) if actor.privileged => (true, false),
            Some(actor) => (
                false,
                self.has_view_record(actor.user_id, listing.id(), listing.item_type())
                    .await?,
            ),
        };
        Ok(resolve_name(listing, privileged, unlocked))
    }

    /// Summary of the user's pass, if they have one.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails.
    pub async fn pass_summary(&self, user_id: UserId) -> Result<Option<PassSummary>, RepositoryError> {
        let now = Utc::now();
        Ok(self.store.find_pass(user_id).await?.map(|pass| PassSummary {
            pass_id: pass.id,
            remaining_count: pass.remaining_count,
            total_count: pass.total_count,
            expires_at: pass.expires_at,
            expired: pass.is_expired(now),
            remaining_days: entitlement::remaining_days(&pass, now),
            expiring_soon: entitlement::expiry_warning(
                &pass,
                now,
                self.settings.expiry_warning_days,
            ),
        }))
    }

    /// The user's usage history, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails.
    pub async fn usage_history(&self, user_id: UserId) -> Result<Vec<UsageEntry>, RepositoryError> {
        Ok(self
            .store
            .find_pass(user_id)
            .await?
            .map(|pass| usage::history_newest_first(&pass.used_history))
            .unwrap_or_default())
    }

    /// Aggregated usage of the user's pass.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails.
    pub async fn usage_statistics(
        &self,
        user_id: UserId,
    ) -> Result<UsageStatistics, RepositoryError> {
        Ok(self
            .store
            .find_pass(user_id)
            .await?
            .map(|pass| usage::usage_statistics(&pass.used_history))
            .unwrap_or_default())
    }

    /// The user's most recent unlocks.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store query fails.
    pub async fn recent_views(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<ViewRecord>, RepositoryError> {
        self.store.list_views(user_id, Some(limit.max(0))).await
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Compare a user's unlocks against their charged usage.
    ///
    /// Reports unlocks with no matching charge. Never adjusts the balance.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store query fails.
    pub async fn audit(&self, user_id: UserId) -> Result<AuditReport, RepositoryError> {
        let pass = self.store.find_pass(user_id).await?;
        let views = self.store.list_views(user_id, None).await?;
        let history = pass
            .as_ref()
            .map(|pass| pass.used_history.as_slice())
            .unwrap_or_default();

        let report = AuditReport {
            user_id,
            pass_id: pass.as_ref().map(|pass| pass.id),
            view_count: views.len(),
            charged_count: history.len(),
            uncharged: usage::find_uncharged_views(&views, history),
        };

        if report.is_consistent() {
            tracing::info!(user_id = %user_id, views = report.view_count, "ledger consistent");
        } else {
            tracing::warn!(
                user_id = %user_id,
                uncharged = report.uncharged.len(),
                "unlocks without a recorded charge"
            );
        }

        Ok(report)
    }

    /// Create or replace a user's pass.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store write fails.
    pub async fn grant_pass(&self, user_id: UserId, grant: PassGrant) -> Result<Pass, RepositoryError> {
        let pass = self.store.upsert_pass(user_id, grant).await?;
        tracing::info!(
            user_id = %user_id,
            pass_id = %pass.id,
            count = grant.count,
            expires_at = %grant.expires_at,
            "viewing pass granted"
        );
        Ok(pass)
    }

    /// Extend a user's pass by `months`, counting from its current expiry or
    /// from now if it already lapsed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user has no pass.
    /// Returns `RepositoryError::DataCorruption` if the new expiry overflows.
    pub async fn extend_pass(&self, user_id: UserId, months: u32) -> Result<Pass, RepositoryError> {
        let pass = self
            .store
            .find_pass(user_id)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let expires_at = entitlement::extended_expiry(pass.expires_at, Utc::now(), months)
            .ok_or_else(|| {
                RepositoryError::DataCorruption(format!("expiry overflow extending by {months} months"))
            })?;

        let pass = self.store.extend_pass(pass.id, expires_at).await?;
        tracing::info!(user_id = %user_id, pass_id = %pass.id, expires_at = %pass.expires_at, "viewing pass extended");
        Ok(pass)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use futures::future::join_all;
    use warehub_core::{FailureReason, ListingProfile};

    use super::*;
    use crate::ledger::{InsertFault, MemoryLedger};

    struct Fixture {
        ledger: Arc<MemoryLedger>,
        service: EntitlementService,
        user_id: UserId,
        item_id: ListingId,
    }

    async fn fixture(remaining_count: i32, expires_in: Duration) -> Fixture {
        fixture_over(MemoryLedger::new(), remaining_count, expires_in).await
    }

    async fn fixture_over(ledger: MemoryLedger, remaining_count: i32, expires_in: Duration) -> Fixture {
        let ledger = Arc::new(ledger);
        let user_id = UserId::generate();
        ledger
            .put_pass(Pass {
                id: PassId::generate(),
                user_id,
                remaining_count,
                total_count: 10,
                expires_at: Utc::now() + expires_in,
                used_history: Vec::new(),
                version: 0,
            })
            .await;
        let service = EntitlementService::new(ledger.clone(), LedgerSettings::default());
        Fixture {
            ledger,
            service,
            user_id,
            item_id: ListingId::generate(),
        }
    }

    impl Fixture {
        async fn consume(&self) -> Result<ConsumeOutcome, ConsumeError> {
            self.service
                .consume(
                    Some(self.user_id),
                    self.item_id,
                    ItemType::Warehouse,
                    Some("용인 물류센터"),
                )
                .await
        }

        async fn remaining(&self) -> i32 {
            self.ledger
                .find_pass(self.user_id)
                .await
                .unwrap()
                .unwrap()
                .remaining_count
        }

        async fn consume_other(&self) -> Result<ConsumeOutcome, ConsumeError> {
            self.service
                .consume(Some(self.user_id), ListingId::generate(), ItemType::Customer, None)
                .await
        }

        async fn unlocked(&self) -> bool {
            self.service
                .has_view_record(self.user_id, self.item_id, ItemType::Warehouse)
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_consume_charges_once_then_reviews_free() {
        let fx = fixture(1, Duration::days(30)).await;

        let first = fx.consume().await.unwrap();
        assert!(matches!(
            first,
            ConsumeOutcome::Charged {
                remaining_count: 0,
                ..
            }
        ));
        assert!(fx.unlocked().await);

        let second = fx.consume().await.unwrap();
        assert_eq!(second, ConsumeOutcome::AlreadyViewed);
        assert_eq!(fx.remaining().await, 0);
        assert_eq!(fx.ledger.charge_count().await, 1);
    }

    #[tokio::test]
    async fn test_consume_records_usage_entry() {
        let fx = fixture(3, Duration::days(30)).await;
        fx.consume().await.unwrap();

        let history = fx.service.usage_history(fx.user_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].item_id, fx.item_id);
        assert_eq!(history[0].item_name, "용인 물류센터");
        assert_eq!(history[0].count_used, 1);
    }

    #[tokio::test]
    async fn test_consume_unauthenticated_touches_nothing() {
        let fx = fixture(1, Duration::days(30)).await;
        fx.ledger.set_view_reads_failing(true).await;

        let err = fx
            .service
            .consume(None, fx.item_id, ItemType::Warehouse, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsumeError::NotAuthenticated));
    }

    #[tokio::test]
    async fn test_consume_exhausted_creates_no_record() {
        let fx = fixture(0, Duration::days(30)).await;

        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::PassExhausted));
        assert!(!fx.unlocked().await);
        assert_eq!(fx.ledger.view_count().await, 0);
    }

    #[tokio::test]
    async fn test_consume_expired() {
        let fx = fixture(5, Duration::days(-1)).await;
        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::PassExpired));
        assert_eq!(fx.remaining().await, 5);
    }

    #[tokio::test]
    async fn test_consume_without_pass() {
        let service = EntitlementService::new(Arc::new(MemoryLedger::new()), LedgerSettings::default());
        let err = service
            .consume(Some(UserId::generate()), ListingId::generate(), ItemType::Customer, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConsumeError::NoPass));
    }

    #[tokio::test]
    async fn test_unlock_survives_expiry_and_exhaustion() {
        let fx = fixture(1, Duration::days(30)).await;
        fx.consume().await.unwrap();

        let mut pass = fx.ledger.find_pass(fx.user_id).await.unwrap().unwrap();
        pass.expires_at = Utc::now() - Duration::days(1);
        fx.ledger.put_pass(pass).await;

        assert!(fx.unlocked().await);
        assert_eq!(fx.consume().await.unwrap(), ConsumeOutcome::AlreadyViewed);
        assert_eq!(
            fx.service
                .evaluate(fx.user_id, fx.item_id, ItemType::Warehouse)
                .await
                .unwrap(),
            Decision::AlreadyViewed
        );
    }

    #[tokio::test]
    async fn test_concurrent_consumes_charge_at_most_once() {
        let fx = fixture(5, Duration::days(30)).await;

        let results = join_all((0..16).map(|_| fx.consume())).await;

        let charged: Vec<i32> = results
            .iter()
            .filter_map(|r| match r {
                Ok(ConsumeOutcome::Charged {
                    remaining_count, ..
                }) => Some(*remaining_count),
                _ => None,
            })
            .collect();
        assert_eq!(charged, vec![4]);
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(fx.remaining().await, 4);
        assert_eq!(fx.ledger.charge_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_consumes_on_spawned_tasks() {
        let fx = Arc::new(fixture(5, Duration::days(30)).await);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let fx = Arc::clone(&fx);
                tokio::spawn(async move { fx.consume().await.map(|o| matches!(o, ConsumeOutcome::Charged { .. })) })
            })
            .collect();

        let mut charges = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                charges += 1;
            }
        }
        assert_eq!(charges, 1);
        assert_eq!(fx.remaining().await, 4);
    }

    #[tokio::test]
    async fn test_spurious_insert_error_resolves_to_already_viewed() {
        let fx = fixture(2, Duration::days(30)).await;
        fx.ledger
            .fail_next_insert(InsertFault::CommitThenError)
            .await;

        assert_eq!(fx.consume().await.unwrap(), ConsumeOutcome::AlreadyViewed);
        assert!(fx.unlocked().await);
        assert_eq!(fx.remaining().await, 2);
    }

    #[tokio::test]
    async fn test_rejected_insert_is_retryable() {
        let fx = fixture(2, Duration::days(30)).await;
        fx.ledger.fail_next_insert(InsertFault::Reject).await;

        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::StoreUnavailable(_)));
        assert!(err.is_retryable());
        assert!(!fx.unlocked().await);

        assert!(matches!(
            fx.consume().await.unwrap(),
            ConsumeOutcome::Charged {
                remaining_count: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invisible_record_after_insert_is_not_charged() {
        let fx = fixture(2, Duration::days(30)).await;
        // Pre-check sees nothing anyway; hide the confirmation read too.
        fx.ledger.hide_view_reads(2).await;

        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::UnlockNotConfirmed));
        assert_eq!(fx.remaining().await, 2);

        // The row did land; a retry short-circuits without charging.
        assert_eq!(fx.consume().await.unwrap(), ConsumeOutcome::AlreadyViewed);
        assert_eq!(fx.remaining().await, 2);
    }

    #[tokio::test]
    async fn test_failed_charge_is_never_retried() {
        let fx = fixture(2, Duration::days(30)).await;
        fx.ledger.fail_next_charge().await;

        let result = fx.consume().await;
        let report = ConsumeOutcome::report(&result);
        assert!(matches!(
            result,
            Err(ConsumeError::ChargeLostAfterUnlock { .. })
        ));
        assert!(report.success);
        assert_eq!(
            report.failure_reason,
            Some(FailureReason::ChargeLostAfterUnlock)
        );
        assert!(fx.unlocked().await);

        assert_eq!(fx.consume().await.unwrap(), ConsumeOutcome::AlreadyViewed);
        assert_eq!(fx.remaining().await, 2);
        assert_eq!(fx.ledger.charge_count().await, 0);

        let audit = fx.service.audit(fx.user_id).await.unwrap();
        assert_eq!(
            audit.uncharged,
            vec![ViewKey::new(fx.user_id, fx.item_id, ItemType::Warehouse)]
        );
    }

    #[tokio::test]
    async fn test_racing_pass_write_is_retried_with_fresh_version() {
        let fx = fixture(3, Duration::days(30)).await;
        fx.ledger.race_next_charges(1).await;

        assert!(matches!(
            fx.consume().await.unwrap(),
            ConsumeOutcome::Charged {
                remaining_count: 2,
                ..
            }
        ));
        assert_eq!(fx.ledger.charge_count().await, 1);
    }

    #[tokio::test]
    async fn test_persistent_pass_races_lose_the_charge() {
        let fx = fixture(3, Duration::days(30)).await;
        fx.ledger.race_next_charges(10).await;

        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::ChargeLostAfterUnlock { .. }));
        assert_eq!(fx.remaining().await, 3);
        assert!(fx.unlocked().await);
    }

    #[tokio::test]
    async fn test_store_failure_during_precheck() {
        let fx = fixture(2, Duration::days(30)).await;
        fx.ledger.set_pass_reads_failing(true).await;

        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::StoreUnavailable(_)));
        assert_eq!(err.reason(), FailureReason::StoreUnavailable);
        assert_eq!(fx.ledger.view_count().await, 0);
    }

    fn count_charged(results: &[Result<ConsumeOutcome, ConsumeError>]) -> usize {
        results
            .iter()
            .filter(|r| matches!(r, Ok(ConsumeOutcome::Charged { .. })))
            .count()
    }

    #[tokio::test]
    async fn test_distinct_listings_all_charged_under_contention() {
        for ledger in [MemoryLedger::new(), MemoryLedger::transactional()] {
            let fx = fixture_over(ledger, 20, Duration::days(30)).await;

            let results = join_all((0..12).map(|_| fx.consume_other())).await;

            assert_eq!(count_charged(&results), 12);
            assert!(results.iter().all(Result::is_ok));
            assert_eq!(fx.remaining().await, 8);
            assert_eq!(fx.ledger.charge_count().await, 12);
            assert!(fx.service.audit(fx.user_id).await.unwrap().is_consistent());
        }
    }

    #[tokio::test]
    async fn test_last_credit_unlocks_one_listing_with_transactions() {
        let fx = fixture_over(MemoryLedger::transactional(), 1, Duration::days(30)).await;

        let results = join_all((0..10).map(|_| fx.consume_other())).await;

        assert_eq!(count_charged(&results), 1);
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(ConsumeError::PassExhausted)))
            .count();
        assert_eq!(exhausted, 9);
        assert_eq!(fx.ledger.view_count().await, 1);
        assert_eq!(fx.remaining().await, 0);
        assert!(fx.service.audit(fx.user_id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_last_credit_contested_without_transactions() {
        let fx = fixture(1, Duration::days(30)).await;

        let results = join_all((0..4).map(|_| fx.consume_other())).await;

        // Unlocks that lost the credit are reported and audited, never free.
        let lost = results
            .iter()
            .filter(|r| matches!(r, Err(ConsumeError::ChargeLostAfterUnlock { .. })))
            .count();
        assert_eq!(count_charged(&results), 1);
        assert_eq!(fx.ledger.charge_count().await, 1);
        assert_eq!(fx.remaining().await, 0);
        assert_eq!(fx.ledger.view_count().await, 1 + lost);
        assert_eq!(fx.service.audit(fx.user_id).await.unwrap().uncharged.len(), lost);
    }

    #[tokio::test]
    async fn test_transactional_consume_charges_once_then_reviews_free() {
        let fx = fixture_over(MemoryLedger::transactional(), 2, Duration::days(30)).await;

        let results = join_all((0..8).map(|_| fx.consume())).await;
        assert_eq!(count_charged(&results), 1);
        assert!(results.iter().all(Result::is_ok));

        assert_eq!(fx.consume().await.unwrap(), ConsumeOutcome::AlreadyViewed);
        assert_eq!(fx.remaining().await, 1);
        let history = fx.service.usage_history(fx.user_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].item_name, "용인 물류센터");
    }

    #[tokio::test]
    async fn test_transactional_failure_unlocks_nothing() {
        let fx = fixture_over(MemoryLedger::transactional(), 2, Duration::days(30)).await;
        fx.ledger.fail_next_charge().await;

        let err = fx.consume().await.unwrap_err();
        assert!(matches!(err, ConsumeError::StoreUnavailable(_)));
        assert!(err.is_retryable());
        assert!(!fx.unlocked().await);
        assert_eq!(fx.remaining().await, 2);

        assert!(matches!(
            fx.consume().await.unwrap(),
            ConsumeOutcome::Charged {
                remaining_count: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_access_and_display_name() {
        let fx = fixture(1, Duration::days(30)).await;
        let owner = UserId::generate();
        let listing = Listing::Warehouse(ListingProfile {
            id: fx.item_id,
            owner_id: Some(owner),
            company_name: Some("한빛물류".to_owned()),
            location: Some("경기".to_owned()),
            city: Some("용인시".to_owned()),
            dong: Some("처인구".to_owned()),
        });
        let viewer = Actor::user(fx.user_id);

        assert_eq!(
            fx.service.check_access(None, &listing).await.unwrap(),
            Access::Unauthenticated
        );
        assert_eq!(
            fx.service.check_access(Some(&viewer), &listing).await.unwrap(),
            Access::Locked
        );
        assert_eq!(
            fx.service
                .check_access(Some(&Actor::user(owner)), &listing)
                .await
                .unwrap(),
            Access::Owner
        );
        assert_eq!(
            fx.service
                .check_access(Some(&Actor::privileged(UserId::generate())), &listing)
                .await
                .unwrap(),
            Access::Privileged
        );
        assert_eq!(
            fx.service.display_name(Some(&viewer), &listing).await.unwrap(),
            "경기 용인시 처인구 창고"
        );

        fx.consume().await.unwrap();

        assert_eq!(
            fx.service.check_access(Some(&viewer), &listing).await.unwrap(),
            Access::Unlocked
        );
        assert_eq!(
            fx.service.display_name(Some(&viewer), &listing).await.unwrap(),
            "한빛물류"
        );
    }

    #[tokio::test]
    async fn test_extend_pass_from_future_expiry() {
        let fx = fixture(1, Duration::days(10)).await;
        let before = fx.ledger.find_pass(fx.user_id).await.unwrap().unwrap();

        let extended = fx.service.extend_pass(fx.user_id, 3).await.unwrap();
        assert!(extended.expires_at > before.expires_at + Duration::days(88));
        assert_eq!(extended.version, before.version + 1);
    }

    #[tokio::test]
    async fn test_extend_missing_pass() {
        let service = EntitlementService::new(Arc::new(MemoryLedger::new()), LedgerSettings::default());
        let err = service.extend_pass(UserId::generate(), 3).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_pass_summary() {
        let fx = fixture(4, Duration::days(5)).await;
        let summary = fx.service.pass_summary(fx.user_id).await.unwrap().unwrap();
        assert_eq!(summary.remaining_count, 4);
        assert!(!summary.expired);
        assert_eq!(summary.remaining_days, 5);
        assert!(summary.expiring_soon);

        assert!(fx.service.pass_summary(UserId::generate()).await.unwrap().is_none());
    }
}
