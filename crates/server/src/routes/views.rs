//! View record routes.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use warehub_core::ViewRecord;

use crate::error::Result;
use crate::middleware::RequireActor;
use crate::state::AppState;

/// Upper bound on the recent-views page size.
const MAX_RECENT_VIEWS: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// GET /api/views/recent
pub async fn recent(
    State(state): State<AppState>,
    RequireActor(actor): RequireActor,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Vec<ViewRecord>>> {
    let limit = query
        .limit
        .unwrap_or(state.config().recent_views_limit)
        .clamp(1, MAX_RECENT_VIEWS);

    Ok(Json(
        state
            .entitlements()
            .recent_views(actor.user_id, limit)
            .await?,
    ))
}
