use crate::dtos::SyncAssignmentRequest;
use crate::startup::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use service_core::error::AppError;
use validator::Validate;

/// Mirror an Operations assignment into the local cache.
pub async fn sync_assignment(
    State(state): State<AppState>,
    Json(request): Json<SyncAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    Ok(Json(state.service.sync_assignment(request).await?))
}
