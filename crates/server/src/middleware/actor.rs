//! Actor extractors.
//!
//! Read the acting user from the session. Consumption and per-user reads
//! require one; display and access checks work without.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use warehub_core::{ConsumeReport, FailureReason};

use crate::models::{Actor, session_keys};

/// Extractor that requires an acting user.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(RequireActor(actor): RequireActor) -> impl IntoResponse {
///     actor.user_id.to_string()
/// }
/// ```
pub struct RequireActor(pub Actor);

/// Rejection when no acting user is present.
#[derive(Debug)]
pub struct ActorRejection;

impl IntoResponse for ActorRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(ConsumeReport::failed(FailureReason::NotAuthenticated)),
        )
            .into_response()
    }
}

async fn current_actor(parts: &Parts) -> Option<Actor> {
    let session = parts.extensions.get::<Session>()?;
    match session.get::<Actor>(session_keys::CURRENT_ACTOR).await {
        Ok(actor) => actor,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read actor from session");
            None
        }
    }
}

impl<S> FromRequestParts<S> for RequireActor
where
    S: Send + Sync,
{
    type Rejection = ActorRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_actor(parts).await.map(Self).ok_or(ActorRejection)
    }
}

/// Extractor that optionally gets the acting user.
pub struct OptionalActor(pub Option<Actor>);

impl<S> FromRequestParts<S> for OptionalActor
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_actor(parts).await))
    }
}

/// Store the acting user in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_actor(
    session: &Session,
    actor: &Actor,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::CURRENT_ACTOR, actor).await
}

/// Remove the acting user from the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_actor(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.remove::<Actor>(session_keys::CURRENT_ACTOR).await?;
    Ok(())
}
