use axum::{extract::State, response::IntoResponse};
use service_core::error::AppError;

use crate::AppState;

pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(state.metrics.render()?)
}
