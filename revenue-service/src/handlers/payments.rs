use crate::dtos::{BatchPaymentRequest, RecordInstallmentPaymentRequest};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn record_installment_payment(
    State(state): State<AppState>,
    Path(installment_id): Path<Uuid>,
    Json(request): Json<RecordInstallmentPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let response = state
        .service
        .record_installment_payment(installment_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn record_payments(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
    Json(request): Json<BatchPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let response = state.service.record_payments(revenue_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
