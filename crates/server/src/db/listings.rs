//! Read-only listing lookups.

use async_trait::async_trait;
use sqlx::PgPool;

use warehub_core::{ItemType, Listing, ListingId, ListingProfile, UserId};

use super::RepositoryError;
use crate::ledger::ListingDirectory;

#[derive(sqlx::FromRow)]
struct ListingRow {
    id: ListingId,
    owner_id: Option<UserId>,
    company_name: Option<String>,
    location: Option<String>,
    city: Option<String>,
    dong: Option<String>,
}

impl From<ListingRow> for ListingProfile {
    fn from(row: ListingRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            company_name: row.company_name,
            location: row.location,
            city: row.city,
            dong: row.dong,
        }
    }
}

/// Listing directory over the `warehub.warehouse` and `warehub.customer` tables.
#[derive(Clone)]
pub struct PgListings {
    pool: PgPool,
}

impl PgListings {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const fn table(item_type: ItemType) -> &'static str {
    match item_type {
        ItemType::Warehouse => "warehub.warehouse",
        ItemType::Customer => "warehub.customer",
    }
}

#[async_trait]
impl ListingDirectory for PgListings {
    async fn find_listing(
        &self,
        item_type: ItemType,
        id: ListingId,
    ) -> Result<Option<Listing>, RepositoryError> {
        let sql = format!(
            "SELECT id, owner_id, company_name, location, city, dong FROM {} WHERE id = $1",
            table(item_type)
        );

        let row = sqlx::query_as::<_, ListingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Listing::new(item_type, row.into())))
    }
}
