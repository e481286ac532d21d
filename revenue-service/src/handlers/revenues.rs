use crate::dtos::{
    AddInstallmentsRequest, CreateRevenueRequest, ListRevenuesParams, RevenueListResponse,
    UpdateRevenueRequest,
};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

const TOTAL_COUNT_HEADER: HeaderName = HeaderName::from_static("x-total-count");

pub async fn create_revenue(
    State(state): State<AppState>,
    Json(request): Json<CreateRevenueRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let response = state.service.create_revenue(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_revenues(
    State(state): State<AppState>,
    Query(params): Query<ListRevenuesParams>,
) -> Result<impl IntoResponse, AppError> {
    let (data, total, filter) = state.service.list_revenues(params).await?;
    let total_pages = (total.max(0) as u64).div_ceil(filter.limit as u64) as u32;

    let count = HeaderValue::from_str(&total.to_string())
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid count header: {}", e)))?;

    Ok((
        [(TOTAL_COUNT_HEADER, count)],
        Json(RevenueListResponse {
            data,
            total,
            page: filter.page,
            limit: filter.limit,
            total_pages,
        }),
    ))
}

pub async fn get_revenue(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.service.get_revenue(revenue_id).await?))
}

pub async fn update_revenue(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
    Json(request): Json<UpdateRevenueRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    Ok(Json(state.service.update_revenue(revenue_id, request).await?))
}

pub async fn delete_revenue(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.delete_revenue(revenue_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_installments(
    State(state): State<AppState>,
    Path(revenue_id): Path<Uuid>,
    Json(request): Json<AddInstallmentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let response = state.service.add_installments(revenue_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
