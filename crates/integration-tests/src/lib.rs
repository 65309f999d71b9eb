//! Integration test harness for Warehub.
//!
//! [`TestApp`] runs the real router in-process over the in-memory ledger and
//! listing directory, with a memory session store and signed cookies.
//! [`TestApp::transactional`] uses a ledger that commits unlock and charge
//! together, like `PostgreSQL`. A test-only
//! `POST /test/login` route stands in for the upstream authentication system
//! by writing the acting user into the session.
//!
//! Tests against `PostgreSQL` read `WAREHUB_TEST_DATABASE_URL` and are
//! `#[ignore]`d by default:
//!
//! ```bash
//! WAREHUB_TEST_DATABASE_URL=postgres://... cargo test -p warehub-integration-tests -- --ignored
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

use warehub_core::{ItemType, Listing, ListingId, ListingProfile, Pass, PassId, UserId};
use warehub_server::config::{SentryConfig, WarehubConfig};
use warehub_server::ledger::{LedgerSettings, MemoryLedger, MemoryListings};
use warehub_server::middleware::session::SESSION_COOKIE_NAME;
use warehub_server::middleware::set_actor;
use warehub_server::models::Actor;
use warehub_server::state::AppState;

/// Configuration suitable for in-process tests.
#[must_use]
pub fn test_config() -> WarehubConfig {
    WarehubConfig {
        database_url: SecretString::from("postgres://localhost/warehub_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        base_url: "http://localhost".to_string(),
        session_secret: SecretString::from(
            "k9$Vq2!mZ7@rT4#xB8&nL1*pW6^cF3%hJ5+dG0=sY8~aQ3?eU7(wI2)oP4[tR9]zMv",
        ),
        ledger: LedgerSettings::default(),
        recent_views_limit: 10,
        sentry: SentryConfig::default(),
    }
}

/// In-process application over memory stores.
pub struct TestApp {
    pub router: Router,
    pub ledger: Arc<MemoryLedger>,
    pub listings: Arc<MemoryListings>,
    pub state: AppState,
}

/// A response with its body decoded as JSON (or a JSON string if it is not JSON).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

async fn login(session: Session, Json(actor): Json<Actor>) -> StatusCode {
    match set_actor(&session, &actor).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ledger(MemoryLedger::new())
    }

    /// App over a ledger with transactional unlock-and-charge.
    #[must_use]
    pub fn transactional() -> Self {
        Self::with_ledger(MemoryLedger::transactional())
    }

    fn with_ledger(ledger: MemoryLedger) -> Self {
        let config = test_config();
        let key = config.session_key().unwrap();
        let ledger = Arc::new(ledger);
        let listings = Arc::new(MemoryListings::new());
        let state = AppState::new(config, ledger.clone(), listings.clone());

        let sessions = SessionManagerLayer::new(MemoryStore::default())
            .with_name(SESSION_COOKIE_NAME)
            .with_secure(false)
            .with_signed(key);

        let router = warehub_server::app(state.clone())
            .merge(Router::new().route("/test/login", post(login)))
            .layer(sessions);

        Self {
            router,
            ledger,
            listings,
            state,
        }
    }

    /// Send a request, optionally with a session cookie and a JSON body.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, cookie, None).await
    }

    pub async fn post(&self, uri: &str, cookie: Option<&str>, body: Option<Value>) -> TestResponse {
        self.send(Method::POST, uri, cookie, body).await
    }

    /// Log `actor` in and return the session cookie to send with requests.
    pub async fn login(&self, actor: Actor) -> String {
        let response = self
            .post(
                "/test/login",
                None,
                Some(serde_json::to_value(actor).unwrap()),
            )
            .await;
        assert_eq!(response.status, StatusCode::NO_CONTENT);

        let set_cookie = response
            .headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Give `user_id` a pass with `remaining_count` credits expiring in `expires_in`.
    pub async fn give_pass(&self, user_id: UserId, remaining_count: i32, expires_in: Duration) -> Pass {
        let pass = Pass {
            id: PassId::generate(),
            user_id,
            remaining_count,
            total_count: remaining_count.max(10),
            expires_at: Utc::now() + expires_in,
            used_history: Vec::new(),
            version: 0,
        };
        self.ledger.put_pass(pass.clone()).await;
        pass
    }

    /// Add a fully-located listing named `company_name`.
    pub async fn add_listing(
        &self,
        item_type: ItemType,
        owner_id: Option<UserId>,
        company_name: &str,
    ) -> Listing {
        let listing = Listing::new(
            item_type,
            ListingProfile {
                id: ListingId::generate(),
                owner_id,
                company_name: Some(company_name.to_string()),
                location: Some("경기".to_string()),
                city: Some("용인시".to_string()),
                dong: Some("처인구".to_string()),
            },
        );
        self.listings.insert(listing.clone()).await;
        listing
    }
}

/// `/api/listings/{type}/{id}/{action}` for a listing.
#[must_use]
pub fn listing_uri(listing: &Listing, action: &str) -> String {
    format!(
        "/api/listings/{}/{}/{action}",
        listing.item_type(),
        listing.id()
    )
}
