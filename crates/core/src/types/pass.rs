//! Viewing pass types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ListingId, PassId, UserId};
use super::listing::ItemType;

/// A user's purchased bundle of view credits.
///
/// There is at most one pass per user. `remaining_count` only goes down
/// through a successful consume and is never negative. `version` is bumped
/// by purchases and extensions, not by charges, so a charge can detect that
/// the pass was replaced underneath it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pass {
    /// Row identity, used as the update target when charging.
    pub id: PassId,
    /// Owner of the pass.
    pub user_id: UserId,
    /// Credits left.
    pub remaining_count: i32,
    /// Credits granted by the last purchase (informational).
    pub total_count: i32,
    /// When the pass stops granting new unlocks.
    pub expires_at: DateTime<Utc>,
    /// Charged unlocks, oldest first. Append-only.
    pub used_history: Vec<UsageEntry>,
    /// Optimistic concurrency version.
    pub version: i32,
}

impl Pass {
    /// Whether the pass has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whether no credits are left.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining_count <= 0
    }
}

/// One charged unlock in a pass's usage history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    /// When the credit was spent.
    #[serde(rename = "date")]
    pub used_at: DateTime<Utc>,
    pub item_id: ListingId,
    pub item_type: ItemType,
    /// Name shown in the history list.
    pub item_name: String,
    /// Credits spent (always 1 for a view).
    pub count_used: i32,
}

impl UsageEntry {
    /// Entry for a single-credit unlock.
    ///
    /// Falls back to `"{type}-{id}"` when no usable item name was supplied.
    #[must_use]
    pub fn single(
        item_id: ListingId,
        item_type: ItemType,
        item_name: Option<&str>,
        used_at: DateTime<Utc>,
    ) -> Self {
        let item_name = item_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map_or_else(|| format!("{item_type}-{item_id}"), str::to_owned);

        Self {
            used_at,
            item_id,
            item_type,
            item_name,
            count_used: 1,
        }
    }
}

/// Parameters for creating or replacing a user's pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassGrant {
    /// Credits granted; becomes both `remaining_count` and `total_count`.
    pub count: i32,
    /// Expiry of the new pass.
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_usage_entry_default_name() {
        let item_id = ListingId::generate();
        let entry = UsageEntry::single(item_id, ItemType::Warehouse, None, Utc::now());
        assert_eq!(entry.item_name, format!("warehouse-{item_id}"));
        assert_eq!(entry.count_used, 1);

        let blank = UsageEntry::single(item_id, ItemType::Customer, Some("  "), Utc::now());
        assert_eq!(blank.item_name, format!("customer-{item_id}"));
    }

    #[test]
    fn test_usage_entry_keeps_given_name() {
        let entry = UsageEntry::single(
            ListingId::generate(),
            ItemType::Warehouse,
            Some("용인 물류센터"),
            Utc::now(),
        );
        assert_eq!(entry.item_name, "용인 물류센터");
    }

    #[test]
    fn test_pass_state() {
        let now = Utc::now();
        let pass = Pass {
            id: PassId::generate(),
            user_id: UserId::generate(),
            remaining_count: 0,
            total_count: 10,
            expires_at: now - Duration::seconds(1),
            used_history: Vec::new(),
            version: 0,
        };
        assert!(pass.is_expired(now));
        assert!(pass.is_exhausted());
    }
}
