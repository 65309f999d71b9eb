//! HTTP route handlers for the API server.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                 - Liveness check
//! GET  /health/ready                           - Readiness check (store reachable)
//!
//! # Pass (requires actor)
//! GET  /api/pass                               - Pass summary
//! GET  /api/pass/history                       - Usage history, newest first
//! GET  /api/pass/stats                         - Usage statistics
//!
//! # Views (requires actor)
//! GET  /api/views/recent?limit=N               - Most recent unlocks
//!
//! # Listings
//! GET  /api/listings/{type}/{id}/entitlement   - Entitlement decision (requires actor)
//! POST /api/listings/{type}/{id}/consume       - Spend a credit to unlock
//! GET  /api/listings/{type}/{id}/access        - Whether details may be opened
//! GET  /api/listings/{type}/{id}/name          - Display name for the actor
//! ```

pub mod health;
pub mod listings;
pub mod pass;
pub mod views;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create the pass routes router.
pub fn pass_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pass::summary))
        .route("/history", get(pass::history))
        .route("/stats", get(pass::stats))
}

/// Create the listing routes router.
pub fn listing_routes() -> Router<AppState> {
    Router::new()
        .route("/{item_type}/{id}/entitlement", get(listings::entitlement))
        .route("/{item_type}/{id}/consume", post(listings::consume))
        .route("/{item_type}/{id}/access", get(listings::access))
        .route("/{item_type}/{id}/name", get(listings::name))
}

/// Create all routes for the API server.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/pass", pass_routes())
        .route("/api/views/recent", get(views::recent))
        .nest("/api/listings", listing_routes())
}
