//! `PostgreSQL` ledger store.
//!
//! Queries are built at runtime so the crate compiles without a live database
//! or an offline query cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument};

use warehub_core::{
    ItemType, ListingId, Pass, PassGrant, PassId, UsageEntry, UserId, ViewKey, ViewRecord,
    ViewRecordId,
};

use super::RepositoryError;
use crate::ledger::{ChargeResult, LedgerStore, UnlockResult};

const PASS_COLUMNS: &str =
    "id, user_id, remaining_count, total_count, expires_at, used_history, version";

#[derive(sqlx::FromRow)]
struct PassRow {
    id: PassId,
    user_id: UserId,
    remaining_count: i32,
    total_count: i32,
    expires_at: DateTime<Utc>,
    used_history: serde_json::Value,
    version: i32,
}

impl TryFrom<PassRow> for Pass {
    type Error = RepositoryError;

    fn try_from(row: PassRow) -> Result<Self, Self::Error> {
        let used_history: Vec<UsageEntry> =
            serde_json::from_value(row.used_history).map_err(|e| {
                RepositoryError::DataCorruption(format!(
                    "invalid usage history for pass {}: {e}",
                    row.id
                ))
            })?;

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            remaining_count: row.remaining_count,
            total_count: row.total_count,
            expires_at: row.expires_at,
            used_history,
            version: row.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ViewRow {
    id: ViewRecordId,
    user_id: UserId,
    item_id: ListingId,
    item_type: ItemType,
    viewed_at: DateTime<Utc>,
}

impl From<ViewRow> for ViewRecord {
    fn from(row: ViewRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            item_id: row.item_id,
            item_type: row.item_type,
            viewed_at: row.viewed_at,
        }
    }
}

/// Ledger store backed by the `warehub` schema.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Create a new ledger store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_pass(
        &self,
        filter: &str,
        id: uuid::Uuid,
    ) -> Result<Option<Pass>, RepositoryError> {
        let sql = format!("SELECT {PASS_COLUMNS} FROM warehub.viewing_pass WHERE {filter} = $1");
        sqlx::query_as::<_, PassRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Pass::try_from)
            .transpose()
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn find_pass(&self, user_id: UserId) -> Result<Option<Pass>, RepositoryError> {
        self.fetch_pass("user_id", user_id.as_uuid()).await
    }

    #[instrument(skip(self), fields(pass_id = %pass_id))]
    async fn find_pass_by_id(&self, pass_id: PassId) -> Result<Option<Pass>, RepositoryError> {
        self.fetch_pass("id", pass_id.as_uuid()).await
    }

    async fn has_view_record(&self, key: ViewKey) -> Result<bool, RepositoryError> {
        let (exists,): (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS (
                SELECT 1 FROM warehub.item_view
                WHERE user_id = $1 AND item_id = $2 AND item_type = $3
            )
            ",
        )
        .bind(key.user_id)
        .bind(key.item_id)
        .bind(key.item_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    #[instrument(skip(self), fields(user_id = %key.user_id, item_id = %key.item_id, item_type = %key.item_type))]
    async fn insert_view_record(
        &self,
        key: ViewKey,
        viewed_at: DateTime<Utc>,
    ) -> Result<ViewRecord, RepositoryError> {
        let row = sqlx::query_as::<_, ViewRow>(
            r"
            INSERT INTO warehub.item_view (user_id, item_id, item_type, viewed_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, item_id, item_type, viewed_at
            ",
        )
        .bind(key.user_id)
        .bind(key.item_id)
        .bind(key.item_type)
        .bind(viewed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "view record"))?;

        debug!(view_id = %row.id, "Inserted view record");
        Ok(row.into())
    }

    #[instrument(skip(self, entry), fields(pass_id = %pass_id))]
    async fn charge_pass(
        &self,
        pass_id: PassId,
        expected_version: i32,
        entry: &UsageEntry,
    ) -> Result<ChargeResult, RepositoryError> {
        let entry = serde_json::to_value(entry).map_err(|e| {
            RepositoryError::DataCorruption(format!("unserializable usage entry: {e}"))
        })?;

        let row: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE warehub.viewing_pass
            SET remaining_count = remaining_count - 1,
                used_history = used_history || jsonb_build_array($3::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND version = $2 AND remaining_count > 0
            RETURNING remaining_count
            ",
        )
        .bind(pass_id)
        .bind(expected_version)
        .bind(entry)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((remaining_count,)) => ChargeResult::Charged { remaining_count },
            None => {
                debug!(expected_version, "Charge matched no row");
                ChargeResult::Stale
            }
        })
    }

    /// Both writes run in one transaction. A concurrent charge of the same
    /// pass blocks on the row lock and then re-checks `remaining_count`, so
    /// one credit unlocks exactly one listing.
    #[instrument(skip(self, entry), fields(user_id = %key.user_id, item_id = %key.item_id, pass_id = %pass_id))]
    async fn unlock_and_charge(
        &self,
        key: ViewKey,
        pass_id: PassId,
        entry: &UsageEntry,
    ) -> Result<Option<UnlockResult>, RepositoryError> {
        let history_entry = serde_json::to_value(entry).map_err(|e| {
            RepositoryError::DataCorruption(format!("unserializable usage entry: {e}"))
        })?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, ViewRow>(
            r"
            INSERT INTO warehub.item_view (user_id, item_id, item_type, viewed_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, item_id, item_type, viewed_at
            ",
        )
        .bind(key.user_id)
        .bind(key.item_id)
        .bind(key.item_type)
        .bind(entry.used_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_insert(e, "view record"));

        let view = match inserted {
            Ok(row) => ViewRecord::from(row),
            Err(RepositoryError::Conflict(_)) => {
                tx.rollback().await?;
                debug!("View record already exists, rolled back");
                return Ok(Some(UnlockResult::AlreadyUnlocked));
            }
            Err(err) => return Err(err),
        };

        let charged: Option<(i32,)> = sqlx::query_as(
            r"
            UPDATE warehub.viewing_pass
            SET remaining_count = remaining_count - 1,
                used_history = used_history || jsonb_build_array($2::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND remaining_count > 0
            RETURNING remaining_count
            ",
        )
        .bind(pass_id)
        .bind(history_entry)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((remaining_count,)) = charged else {
            tx.rollback().await?;
            debug!("Pass has no credit left, rolled back");
            return Ok(Some(UnlockResult::Exhausted));
        };

        tx.commit().await?;

        debug!(view_id = %view.id, remaining_count, "Unlocked and charged");
        Ok(Some(UnlockResult::Charged {
            view,
            remaining_count,
        }))
    }

    #[instrument(skip(self, grant), fields(user_id = %user_id, count = grant.count))]
    async fn upsert_pass(
        &self,
        user_id: UserId,
        grant: PassGrant,
    ) -> Result<Pass, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO warehub.viewing_pass (user_id, remaining_count, total_count, expires_at)
            VALUES ($1, $2, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET remaining_count = EXCLUDED.remaining_count,
                total_count = EXCLUDED.total_count,
                expires_at = EXCLUDED.expires_at,
                purchased_at = NOW(),
                version = warehub.viewing_pass.version + 1,
                updated_at = NOW()
            RETURNING {PASS_COLUMNS}
            "
        );

        sqlx::query_as::<_, PassRow>(&sql)
            .bind(user_id)
            .bind(grant.count)
            .bind(grant.expires_at)
            .fetch_one(&self.pool)
            .await?
            .try_into()
    }

    #[instrument(skip(self), fields(pass_id = %pass_id))]
    async fn extend_pass(
        &self,
        pass_id: PassId,
        expires_at: DateTime<Utc>,
    ) -> Result<Pass, RepositoryError> {
        let sql = format!(
            r"
            UPDATE warehub.viewing_pass
            SET expires_at = $2,
                extended_at = NOW(),
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PASS_COLUMNS}
            "
        );

        sqlx::query_as::<_, PassRow>(&sql)
            .bind(pass_id)
            .bind(expires_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    async fn list_views(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> Result<Vec<ViewRecord>, RepositoryError> {
        // LIMIT NULL returns every row.
        let rows = sqlx::query_as::<_, ViewRow>(
            r"
            SELECT id, user_id, item_id, item_type, viewed_at
            FROM warehub.item_view
            WHERE user_id = $1
            ORDER BY viewed_at DESC
            LIMIT $2
            ",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ViewRecord::from).collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
