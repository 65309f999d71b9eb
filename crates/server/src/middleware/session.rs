//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions, with cookies
//! signed by the configured session secret.

use sqlx::PgPool;
use tower_sessions::cookie::Key;
use tower_sessions::service::SignedCookie;
use tower_sessions::{Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::WarehubConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "warehub_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// The sessions table is created by migration, not here.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &WarehubConfig,
    key: Key,
) -> SessionManagerLayer<PostgresStore, SignedCookie> {
    let store = PostgresStore::new(pool.clone());
    let is_secure = config.base_url.starts_with("https://");

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(key)
}
