//! Listing kinds and the shared listing projection.
//!
//! Warehouses and customers are stored in different tables by the listing
//! service, but the entitlement and display logic only ever needs the same
//! handful of fields from either. [`Listing`] is the tagged variant over the
//! two kinds; [`ListingProfile`] is the common shape both carry.

use serde::{Deserialize, Serialize};

use super::id::{ListingId, UserId};

/// The kind of listing a view record or usage entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "warehub.item_type", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    /// A warehouse operator's listing.
    Warehouse,
    /// A shipping customer's listing.
    Customer,
}

/// Error parsing an [`ItemType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid item type: {0}")]
pub struct ItemTypeError(pub String);

impl ItemType {
    /// Wire/database name (`warehouse` or `customer`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warehouse => "warehouse",
            Self::Customer => "customer",
        }
    }

    /// Label used in masked listing names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Warehouse => "창고",
            Self::Customer => "고객사",
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = ItemTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warehouse" => Ok(Self::Warehouse),
            "customer" => Ok(Self::Customer),
            _ => Err(ItemTypeError(s.to_owned())),
        }
    }
}

/// Fields shared by every listing kind.
///
/// Location fields are optional because the listing service does not require
/// them; empty strings are treated the same as missing values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingProfile {
    /// Listing ID.
    pub id: ListingId,
    /// User who owns the listing, if claimed.
    pub owner_id: Option<UserId>,
    /// Real company name, revealed only once unlocked.
    pub company_name: Option<String>,
    /// Region (e.g. `경기`).
    pub location: Option<String>,
    /// City (e.g. `용인시`).
    pub city: Option<String>,
    /// District (e.g. `처인구`).
    pub dong: Option<String>,
}

/// A warehouse or customer listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "lowercase")]
pub enum Listing {
    Warehouse(ListingProfile),
    Customer(ListingProfile),
}

impl Listing {
    /// Build a listing of the given kind from its shared projection.
    #[must_use]
    pub const fn new(item_type: ItemType, profile: ListingProfile) -> Self {
        match item_type {
            ItemType::Warehouse => Self::Warehouse(profile),
            ItemType::Customer => Self::Customer(profile),
        }
    }

    /// The kind of this listing.
    #[must_use]
    pub const fn item_type(&self) -> ItemType {
        match self {
            Self::Warehouse(_) => ItemType::Warehouse,
            Self::Customer(_) => ItemType::Customer,
        }
    }

    /// The shared projection.
    #[must_use]
    pub const fn profile(&self) -> &ListingProfile {
        match self {
            Self::Warehouse(profile) | Self::Customer(profile) => profile,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ListingId {
        self.profile().id
    }

    /// Whether `user_id` owns this listing.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.profile().owner_id == Some(user_id)
    }
}
