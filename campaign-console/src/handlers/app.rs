use askama::Template;
use axum::{extract::State, response::IntoResponse};
use service_core::error::AppError;
use tower_sessions::Session;

use crate::AppState;

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub signed_in: bool,
}

pub async fn index(
    State(state): State<AppState>,
    session: Session,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = state
        .sessions
        .snapshot(&session)
        .await
        .map_err(|e| AppError::InternalError(e.into()))?;
    Ok(IndexTemplate {
        signed_in: snapshot.is_signed_in(),
    })
}

pub async fn health_check() -> &'static str {
    "OK"
}
