//! HTTP tests for listing consumption and display.
//!
//! Run in-process over the memory stores; no database or server needed.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use warehub_core::{ItemType, UserId};
use warehub_server::models::Actor;
use warehub_integration_tests::{TestApp, listing_uri};

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_consume_without_actor_is_rejected() {
    let app = TestApp::new();
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;

    let response = app.post(&listing_uri(&listing, "consume"), None, None).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["failure_reason"], "not_authenticated");
    assert_eq!(app.ledger.view_count().await, 0);
}

#[tokio::test]
async fn test_account_routes_require_actor() {
    let app = TestApp::new();
    let listing = app.add_listing(ItemType::Customer, None, "바른유통").await;

    for uri in [
        "/api/pass".to_string(),
        "/api/pass/history".to_string(),
        "/api/pass/stats".to_string(),
        "/api/views/recent".to_string(),
        listing_uri(&listing, "entitlement"),
    ] {
        let response = app.get(&uri, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
    }
}

// ============================================================================
// Consume
// ============================================================================

#[tokio::test]
async fn test_consume_last_credit_then_review_free() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 1, Duration::days(30)).await;
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let cookie = app.login(Actor::user(user)).await;
    let uri = listing_uri(&listing, "consume");

    let first = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["success"], true);
    assert_eq!(first.body["already_viewed"], false);
    assert_eq!(first.body["remaining_count"], 0);

    let second = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["success"], true);
    assert_eq!(second.body["already_viewed"], true);

    let pass = app.get("/api/pass", Some(&cookie)).await;
    assert_eq!(pass.body["pass"]["remaining_count"], 0);
    assert_eq!(app.ledger.charge_count().await, 1);
}

#[tokio::test]
async fn test_consume_records_company_name_in_history() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 3, Duration::days(30)).await;
    let warehouse = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let customer = app.add_listing(ItemType::Customer, None, "바른유통").await;
    let cookie = app.login(Actor::user(user)).await;

    app.post(&listing_uri(&warehouse, "consume"), Some(&cookie), None)
        .await;
    app.post(
        &listing_uri(&customer, "consume"),
        Some(&cookie),
        Some(json!({ "item_name": "바른유통 본사" })),
    )
    .await;

    let history = app.get("/api/pass/history", Some(&cookie)).await;
    let names: Vec<&str> = history
        .body
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["item_name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"한빛물류"));
    assert!(names.contains(&"바른유통 본사"));

    let stats = app.get("/api/pass/stats", Some(&cookie)).await;
    assert_eq!(stats.body["total_used"], 2);
    assert_eq!(stats.body["item_type_stats"]["warehouse"], 1);
    assert_eq!(stats.body["item_type_stats"]["customer"], 1);
}

#[tokio::test]
async fn test_consume_blocked_by_pass_state() {
    let app = TestApp::new();
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let uri = listing_uri(&listing, "consume");

    let no_pass = app.login(Actor::user(UserId::generate())).await;
    let response = app.post(&uri, Some(&no_pass), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["failure_reason"], "no_pass");

    let exhausted_user = UserId::generate();
    app.give_pass(exhausted_user, 0, Duration::days(30)).await;
    let exhausted = app.login(Actor::user(exhausted_user)).await;
    let response = app.post(&uri, Some(&exhausted), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["failure_reason"], "pass_exhausted");

    let expired_user = UserId::generate();
    app.give_pass(expired_user, 5, Duration::days(-1)).await;
    let expired = app.login(Actor::user(expired_user)).await;
    let response = app.post(&uri, Some(&expired), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["failure_reason"], "pass_expired");
    assert!(response.body["message"].is_string());

    assert_eq!(app.ledger.view_count().await, 0);
}

#[tokio::test]
async fn test_consume_unknown_listing() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 1, Duration::days(30)).await;
    let cookie = app.login(Actor::user(user)).await;

    let uri = format!("/api/listings/warehouse/{}/consume", uuid::Uuid::new_v4());
    let response = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .post("/api/listings/factory/not-a-uuid/consume", Some(&cookie), None)
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_lost_charge_still_unlocks() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 2, Duration::days(30)).await;
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let cookie = app.login(Actor::user(user)).await;
    app.ledger.fail_next_charge().await;

    let response = app
        .post(&listing_uri(&listing, "consume"), Some(&cookie), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["failure_reason"], "charge_lost_after_unlock");

    let access = app.get(&listing_uri(&listing, "access"), Some(&cookie)).await;
    assert_eq!(access.body["access"], "unlocked");

    let audit = app.state.entitlements().audit(user).await.unwrap();
    assert_eq!(audit.uncharged.len(), 1);
}

#[tokio::test]
async fn test_store_outage_is_retryable() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 2, Duration::days(30)).await;
    let listing = app.add_listing(ItemType::Customer, None, "바른유통").await;
    let cookie = app.login(Actor::user(user)).await;
    let uri = listing_uri(&listing, "consume");

    app.ledger.set_view_reads_failing(true).await;
    let response = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["failure_reason"], "store_unavailable");

    app.ledger.set_view_reads_failing(false).await;
    let response = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["remaining_count"], 1);
}

#[tokio::test]
async fn test_listing_lookup_outage_is_retryable() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 2, Duration::days(30)).await;
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let cookie = app.login(Actor::user(user)).await;
    let uri = listing_uri(&listing, "consume");

    app.listings.set_failing(true);
    let response = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["success"], false);
    assert_eq!(response.body["failure_reason"], "store_unavailable");
    assert_eq!(app.ledger.view_count().await, 0);

    app.listings.set_failing(false);
    let response = app.post(&uri, Some(&cookie), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["remaining_count"], 1);
}

// ============================================================================
// Entitlement, access and names
// ============================================================================

#[tokio::test]
async fn test_entitlement_prompts() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 1, Duration::days(30)).await;
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let cookie = app.login(Actor::user(user)).await;
    let uri = listing_uri(&listing, "entitlement");

    let before = app.get(&uri, Some(&cookie)).await;
    assert_eq!(before.body["decision"], "GRANT");
    assert_eq!(before.body["prompt"], "confirm_use");

    app.post(&listing_uri(&listing, "consume"), Some(&cookie), None)
        .await;

    let after = app.get(&uri, Some(&cookie)).await;
    assert_eq!(after.body["decision"], "ALREADY_VIEWED");
    assert_eq!(after.body["prompt"], "open");

    let other = app.add_listing(ItemType::Customer, None, "바른유통").await;
    let exhausted = app
        .get(&listing_uri(&other, "entitlement"), Some(&cookie))
        .await;
    assert_eq!(exhausted.body["decision"], "EXHAUSTED");
    assert_eq!(exhausted.body["prompt"], "purchase");
    assert_eq!(exhausted.body["allows_view"], false);
}

#[tokio::test]
async fn test_name_masked_until_unlocked() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 1, Duration::days(30)).await;
    let listing = app.add_listing(ItemType::Warehouse, None, "한빛물류").await;
    let cookie = app.login(Actor::user(user)).await;
    let uri = listing_uri(&listing, "name");

    let anonymous = app.get(&uri, None).await;
    assert_eq!(anonymous.body["name"], "경기 용인시 처인구 창고");

    let locked = app.get(&uri, Some(&cookie)).await;
    assert_eq!(locked.body["name"], "경기 용인시 처인구 창고");

    app.post(&listing_uri(&listing, "consume"), Some(&cookie), None)
        .await;

    let unlocked = app.get(&uri, Some(&cookie)).await;
    assert_eq!(unlocked.body["name"], "한빛물류");

    let admin = app.login(Actor::privileged(UserId::generate())).await;
    let privileged = app.get(&uri, Some(&admin)).await;
    assert_eq!(privileged.body["name"], "한빛물류");
}

#[tokio::test]
async fn test_access_for_owner_and_strangers() {
    let app = TestApp::new();
    let owner = UserId::generate();
    let listing = app
        .add_listing(ItemType::Customer, Some(owner), "바른유통")
        .await;
    let uri = listing_uri(&listing, "access");

    let anonymous = app.get(&uri, None).await;
    assert_eq!(anonymous.body["access"], "unauthenticated");
    assert_eq!(anonymous.body["allowed"], false);

    let owner_cookie = app.login(Actor::user(owner)).await;
    let own = app.get(&uri, Some(&owner_cookie)).await;
    assert_eq!(own.body["access"], "owner");
    assert_eq!(own.body["allowed"], true);

    let stranger = app.login(Actor::user(UserId::generate())).await;
    let locked = app.get(&uri, Some(&stranger)).await;
    assert_eq!(locked.body["access"], "locked");
    assert_eq!(locked.body["allowed"], false);
}

// ============================================================================
// Account views
// ============================================================================

#[tokio::test]
async fn test_recent_views_limit() {
    let app = TestApp::new();
    let user = UserId::generate();
    app.give_pass(user, 5, Duration::days(30)).await;
    let cookie = app.login(Actor::user(user)).await;

    for name in ["가", "나", "다"] {
        let listing = app.add_listing(ItemType::Warehouse, None, name).await;
        app.post(&listing_uri(&listing, "consume"), Some(&cookie), None)
            .await;
    }

    let all = app.get("/api/views/recent", Some(&cookie)).await;
    assert_eq!(all.body.as_array().unwrap().len(), 3);

    let limited = app.get("/api/views/recent?limit=2", Some(&cookie)).await;
    assert_eq!(limited.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_pass_summary_without_pass() {
    let app = TestApp::new();
    let cookie = app.login(Actor::user(UserId::generate())).await;

    let response = app.get("/api/pass", Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["pass"].is_null());

    let stats = app.get("/api/pass/stats", Some(&cookie)).await;
    assert_eq!(stats.body["total_used"], 0);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_and_request_id() {
    let app = TestApp::new();

    let health = app.get("/health", None).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body, "ok");
    assert!(health.headers.contains_key("x-request-id"));

    let ready = app.get("/health/ready", None).await;
    assert_eq!(ready.status, StatusCode::OK);
}
