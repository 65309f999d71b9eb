//! Listing entitlement routes.
//!
//! All routes address a listing as `/{item_type}/{id}` where `item_type` is
//! `warehouse` or `customer`.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};

use warehub_core::{ConsumeReport, Decision, ItemType, Listing, ListingId, Prompt};

use crate::error::{AppError, Result, set_sentry_user};
use crate::ledger::{Access, ConsumeError, ConsumeOutcome};
use crate::middleware::{OptionalActor, RequireActor};
use crate::state::AppState;

/// Raw path segments identifying a listing.
#[derive(Debug, Deserialize)]
pub struct ListingPath {
    pub item_type: String,
    pub id: String,
}

impl ListingPath {
    fn parse(&self) -> Result<(ItemType, ListingId)> {
        let item_type = self
            .item_type
            .parse::<ItemType>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        let id = self
            .id
            .parse::<ListingId>()
            .map_err(|_| AppError::BadRequest(format!("invalid listing id: {}", self.id)))?;
        Ok((item_type, id))
    }
}

async fn load_listing(state: &AppState, path: &ListingPath) -> Result<Listing> {
    let (item_type, id) = path.parse()?;
    state
        .listings()
        .find_listing(item_type, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{item_type} {id}")))
}

// ============================================================================
// Entitlement
// ============================================================================

/// Response for an entitlement check.
#[derive(Debug, Serialize)]
pub struct EntitlementResponse {
    pub decision: Decision,
    pub prompt: Prompt,
    pub allows_view: bool,
}

/// GET /api/listings/{item_type}/{id}/entitlement
///
/// Evaluates without side effects; nothing is charged.
pub async fn entitlement(
    State(state): State<AppState>,
    RequireActor(actor): RequireActor,
    Path(path): Path<ListingPath>,
) -> Result<Json<EntitlementResponse>> {
    let (item_type, id) = path.parse()?;
    let decision = state
        .entitlements()
        .evaluate(actor.user_id, id, item_type)
        .await?;

    Ok(Json(EntitlementResponse {
        decision,
        prompt: decision.prompt(),
        allows_view: decision.allows_view(),
    }))
}

// ============================================================================
// Consume
// ============================================================================

/// Optional body of a consume request.
#[derive(Debug, Default, Deserialize)]
pub struct ConsumeRequest {
    /// Name recorded in the usage history. Defaults to the listing's company
    /// name.
    pub item_name: Option<String>,
}

/// POST /api/listings/{item_type}/{id}/consume
///
/// Spends one credit unless the listing is already unlocked. A charge lost
/// after a durable unlock is reported with `success: true`.
pub async fn consume(
    State(state): State<AppState>,
    OptionalActor(actor): OptionalActor,
    Path(path): Path<ListingPath>,
    body: Option<Json<ConsumeRequest>>,
) -> Result<Json<ConsumeReport>> {
    let Some(actor) = actor else {
        return Err(ConsumeError::NotAuthenticated.into());
    };
    set_sentry_user(&actor.user_id);

    // Nothing is unlocked yet, so a failed lookup is retryable.
    let listing = match load_listing(&state, &path).await {
        Err(AppError::Database(err)) => return Err(ConsumeError::StoreUnavailable(err).into()),
        other => other?,
    };
    let request = body.map(|Json(body)| body).unwrap_or_default();
    let item_name = request
        .item_name
        .or_else(|| listing.profile().company_name.clone());

    let result = state
        .entitlements()
        .consume(
            Some(actor.user_id),
            listing.id(),
            listing.item_type(),
            item_name.as_deref(),
        )
        .await;

    match result {
        Ok(_) | Err(ConsumeError::ChargeLostAfterUnlock { .. }) => {
            Ok(Json(ConsumeOutcome::report(&result)))
        }
        Err(err) => Err(err.into()),
    }
}

// ============================================================================
// Access and display
// ============================================================================

/// Response for an access check.
#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub access: Access,
    pub allowed: bool,
}

/// GET /api/listings/{item_type}/{id}/access
pub async fn access(
    State(state): State<AppState>,
    OptionalActor(actor): OptionalActor,
    Path(path): Path<ListingPath>,
) -> Result<Json<AccessResponse>> {
    let listing = load_listing(&state, &path).await?;
    let access = state
        .entitlements()
        .check_access(actor.as_ref(), &listing)
        .await?;

    Ok(Json(AccessResponse {
        access,
        allowed: access.is_allowed(),
    }))
}

/// Response for a display-name lookup.
#[derive(Debug, Serialize)]
pub struct NameResponse {
    pub name: String,
}

/// GET /api/listings/{item_type}/{id}/name
pub async fn name(
    State(state): State<AppState>,
    OptionalActor(actor): OptionalActor,
    Path(path): Path<ListingPath>,
) -> Result<Json<NameResponse>> {
    let listing = load_listing(&state, &path).await?;
    let name = state
        .entitlements()
        .display_name(actor.as_ref(), &listing)
        .await?;

    Ok(Json(NameResponse { name }))
}
