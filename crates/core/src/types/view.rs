//! View records: permanent proof that a user unlocked a listing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ListingId, UserId, ViewRecordId};
use super::listing::ItemType;

/// The uniqueness key of a view record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViewKey {
    pub user_id: UserId,
    pub item_id: ListingId,
    pub item_type: ItemType,
}

impl ViewKey {
    #[must_use]
    pub const fn new(user_id: UserId, item_id: ListingId, item_type: ItemType) -> Self {
        Self {
            user_id,
            item_id,
            item_type,
        }
    }
}

/// A user's unlock of one listing.
///
/// Created once per [`ViewKey`] and never deleted. Its existence is what makes
/// a listing viewable, independent of the state of the user's pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewRecord {
    pub id: ViewRecordId,
    pub user_id: UserId,
    pub item_id: ListingId,
    pub item_type: ItemType,
    pub viewed_at: DateTime<Utc>,
}

impl ViewRecord {
    #[must_use]
    pub const fn key(&self) -> ViewKey {
        ViewKey::new(self.user_id, self.item_id, self.item_type)
    }
}
