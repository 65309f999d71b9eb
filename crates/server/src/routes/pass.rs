//! Pass account routes.

use axum::{Json, extract::State};
use serde::Serialize;

use warehub_core::UsageEntry;
use warehub_core::usage::UsageStatistics;

use crate::error::Result;
use crate::ledger::PassSummary;
use crate::middleware::RequireActor;
use crate::state::AppState;

/// Response for the pass summary.
#[derive(Debug, Serialize)]
pub struct PassResponse {
    /// `null` when the user never bought a pass.
    pub pass: Option<PassSummary>,
}

/// GET /api/pass
pub async fn summary(
    State(state): State<AppState>,
    RequireActor(actor): RequireActor,
) -> Result<Json<PassResponse>> {
    let pass = state.entitlements().pass_summary(actor.user_id).await?;
    Ok(Json(PassResponse { pass }))
}

/// GET /api/pass/history
pub async fn history(
    State(state): State<AppState>,
    RequireActor(actor): RequireActor,
) -> Result<Json<Vec<UsageEntry>>> {
    Ok(Json(state.entitlements().usage_history(actor.user_id).await?))
}

/// GET /api/pass/stats
pub async fn stats(
    State(state): State<AppState>,
    RequireActor(actor): RequireActor,
) -> Result<Json<UsageStatistics>> {
    Ok(Json(
        state.entitlements().usage_statistics(actor.user_id).await?,
    ))
}
