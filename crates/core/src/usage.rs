//! Usage history ordering, statistics and reconciliation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{ItemType, ListingId, UsageEntry, ViewKey, ViewRecord};

/// Credits spent in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    /// `YYYY-MM` (UTC).
    pub month: String,
    pub count: i64,
}

/// Credits spent per listing kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTypeUsage {
    pub warehouse: i64,
    pub customer: i64,
}

/// Aggregated usage of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStatistics {
    /// Oldest month first.
    pub monthly_usage: Vec<MonthlyUsage>,
    pub item_type_stats: ItemTypeUsage,
    pub total_used: i64,
}

/// Usage history sorted newest first.
#[must_use]
pub fn history_newest_first(history: &[UsageEntry]) -> Vec<UsageEntry> {
    let mut sorted = history.to_vec();
    sorted.sort_by(|a, b| b.used_at.cmp(&a.used_at));
    sorted
}

/// Aggregate a usage history.
#[must_use]
pub fn usage_statistics(history: &[UsageEntry]) -> UsageStatistics {
    let mut monthly: BTreeMap<String, i64> = BTreeMap::new();
    let mut by_type = ItemTypeUsage::default();
    let mut total_used = 0;

    for entry in history {
        let count = i64::from(entry.count_used);
        *monthly
            .entry(entry.used_at.format("%Y-%m").to_string())
            .or_insert(0) += count;

        match entry.item_type {
            ItemType::Warehouse => by_type.warehouse += count,
            ItemType::Customer => by_type.customer += count,
        }
        total_used += count;
    }

    UsageStatistics {
        monthly_usage: monthly
            .into_iter()
            .map(|(month, count)| MonthlyUsage { month, count })
            .collect(),
        item_type_stats: by_type,
        total_used,
    }
}

/// View records with no matching charge in the usage history.
///
/// These are unlocks whose decrement was lost after the record became durable,
/// so the balance is higher than the number of unlocks implies. Returned
/// oldest first.
#[must_use]
pub fn find_uncharged_views(views: &[ViewRecord], history: &[UsageEntry]) -> Vec<ViewKey> {
    let charged: BTreeSet<(ListingId, ItemType)> = history
        .iter()
        .map(|entry| (entry.item_id, entry.item_type))
        .collect();

    let mut uncharged: Vec<&ViewRecord> = views
        .iter()
        .filter(|view| !charged.contains(&(view.item_id, view.item_type)))
        .collect();
    uncharged.sort_by_key(|view| view.viewed_at);
    uncharged.into_iter().map(ViewRecord::key).collect()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::types::{UserId, ViewRecordId};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
            .single()
            .unwrap_or_default()
    }

    fn entry(item_type: ItemType, used_at: DateTime<Utc>) -> UsageEntry {
        UsageEntry::single(ListingId::generate(), item_type, None, used_at)
    }

    #[test]
    fn test_history_newest_first() {
        let history = vec![
            entry(ItemType::Warehouse, at(2026, 1, 1)),
            entry(ItemType::Customer, at(2026, 3, 1)),
            entry(ItemType::Warehouse, at(2026, 2, 1)),
        ];
        let sorted = history_newest_first(&history);
        let dates: Vec<_> = sorted.iter().map(|e| e.used_at).collect();
        assert_eq!(dates, vec![at(2026, 3, 1), at(2026, 2, 1), at(2026, 1, 1)]);
    }

    #[test]
    fn test_usage_statistics() {
        let history = vec![
            entry(ItemType::Warehouse, at(2026, 2, 3)),
            entry(ItemType::Customer, at(2026, 1, 20)),
            entry(ItemType::Warehouse, at(2026, 2, 28)),
        ];
        let stats = usage_statistics(&history);

        assert_eq!(stats.total_used, 3);
        assert_eq!(stats.item_type_stats.warehouse, 2);
        assert_eq!(stats.item_type_stats.customer, 1);
        assert_eq!(
            stats.monthly_usage,
            vec![
                MonthlyUsage {
                    month: "2026-01".to_owned(),
                    count: 1
                },
                MonthlyUsage {
                    month: "2026-02".to_owned(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_usage_statistics_empty() {
        assert_eq!(usage_statistics(&[]), UsageStatistics::default());
    }

    #[test]
    fn test_find_uncharged_views() {
        let user_id = UserId::generate();
        let charged = entry(ItemType::Warehouse, at(2026, 1, 1));
        let view = |item_id, item_type, viewed_at| ViewRecord {
            id: ViewRecordId::generate(),
            user_id,
            item_id,
            item_type,
            viewed_at,
        };

        let lost_later = ListingId::generate();
        let lost_earlier = ListingId::generate();
        let views = vec![
            view(charged.item_id, ItemType::Warehouse, at(2026, 1, 1)),
            view(lost_later, ItemType::Customer, at(2026, 2, 1)),
            view(lost_earlier, ItemType::Warehouse, at(2026, 1, 15)),
            // Same listing id but a different kind is a different unlock.
            view(charged.item_id, ItemType::Customer, at(2026, 3, 1)),
        ];

        let uncharged = find_uncharged_views(&views, &[charged.clone()]);
        assert_eq!(
            uncharged,
            vec![
                ViewKey::new(user_id, lost_earlier, ItemType::Warehouse),
                ViewKey::new(user_id, lost_later, ItemType::Customer),
                ViewKey::new(user_id, charged.item_id, ItemType::Customer),
            ]
        );
    }
}
