use crate::dtos::{LoanRequest, LoanResponse};
use crate::services::loan::ShareRequest;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// Generate or refresh the shortage loan. An empty body uses the configured
/// split, or the loan's current split when one exists.
pub async fn refresh_loan(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
    request: Option<Json<LoanRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let shares = request
        .shares
        .map(|shares| shares.into_iter().map(ShareRequest::from).collect());
    let loan = state.service.refresh_loan(revenue_id, shares).await?;
    Ok(Json(LoanResponse { loan }))
}

pub async fn get_loan(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service.get_loan(revenue_id).await?))
}
