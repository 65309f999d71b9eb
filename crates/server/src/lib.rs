//! Warehub API server library.
//!
//! Viewing-pass entitlements over HTTP: pass summaries, usage history,
//! listing unlocks with at-most-once charging, and masked listing names.
//! Exposed as a library so the router can be exercised in tests and the CLI
//! can reuse the store and service layers.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the application router without the session layer.
///
/// Callers add the session layer for their store (`PostgreSQL` in the
/// server binary, memory in tests).
pub fn app(state: AppState) -> Router {
    routes::routes().with_state(state).layer(
        ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                    )
                }),
            )
            .layer(axum::middleware::from_fn(
                middleware::request_id_middleware,
            )),
    )
}
