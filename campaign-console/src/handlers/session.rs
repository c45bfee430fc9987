use axum::{extract::State, Json};
use service_core::error::AppError;
use tower_sessions::Session;

use crate::session::SessionSnapshot;
use crate::AppState;

/// The calling browser's snapshot as JSON.
pub async fn current_session(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = state
        .sessions
        .snapshot(&session)
        .await
        .map_err(|e| AppError::InternalError(e.into()))?;
    Ok(Json(snapshot.as_ref().clone()))
}
