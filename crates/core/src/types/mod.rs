//! Core types for Warehub.
//!
//! This module provides type-safe wrappers for the entitlement domain.

pub mod id;
pub mod listing;
pub mod pass;
pub mod view;

pub use id::*;
pub use listing::{ItemType, ItemTypeError, Listing, ListingProfile};
pub use pass::{Pass, PassGrant, UsageEntry};
pub use view::{ViewKey, ViewRecord};
