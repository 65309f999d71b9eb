//! Warehub Core - Shared domain types and entitlement logic.
//!
//! This crate provides the types and pure decision logic used across all
//! Warehub components:
//! - `server` - JSON API for listings, passes and view records
//! - `cli` - Command-line tools for migrations, pass administration and audits
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Everything here is deterministic given its inputs
//! (including the `now` timestamp), which keeps it cheap to call on every
//! render and trivial to test.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, listings, passes and view records
//! - [`entitlement`] - Whether viewing a listing may consume a pass unit
//! - [`display`] - Masked vs. real company labels for listing cards
//! - [`usage`] - Usage history ordering, statistics and reconciliation
//! - [`outcome`] - Failure taxonomy and the consume report sent to clients

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod display;
pub mod entitlement;
pub mod outcome;
pub mod types;
pub mod usage;

pub use display::resolve_name;
pub use entitlement::{Decision, Prompt, evaluate};
pub use outcome::{ConsumeReport, FailureReason};
pub use types::*;
