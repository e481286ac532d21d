use crate::models::{
    Attachment, CategoryKind, InstallmentStatus, LoanDetail, Period, RevenueInstallment,
    RevenuePayment, RevenueRecord, SortField, SortOrder,
};
use crate::services::calculator::BoundaryLossInfo;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InstallmentInput {
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
}

/// A file sent inline with a create request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AttachmentUpload {
    #[validate(length(min = 1, max = 255, message = "file_name must be 1-255 characters"))]
    pub file_name: String,
    pub content_type: Option<String>,
    #[validate(length(min = 1, message = "content_base64 is required"))]
    pub content_base64: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRevenueRequest {
    /// Optional when `bus_trip_id` resolves an assignment.
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1, message = "bus_trip_id must not be empty"))]
    pub bus_trip_id: Option<String>,
    #[validate(length(min = 1, message = "assignment_id must not be empty"))]
    pub assignment_id: Option<String>,
    pub total_amount: Option<Decimal>,
    pub collection_date: NaiveDate,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub remarks: String,
    #[serde(default)]
    pub is_receivable: bool,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 255, message = "payer_name must be at most 255 characters"))]
    pub payer_name: Option<String>,
    pub interest_rate: Option<Decimal>,
    #[serde(default)]
    pub installments: Vec<InstallmentInput>,
    #[serde(default)]
    #[validate(nested)]
    pub attachments: Vec<AttachmentUpload>,
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateRevenueRequest {
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1, message = "assignment_id must not be empty"))]
    pub assignment_id: Option<String>,
    pub total_amount: Option<Decimal>,
    pub collection_date: Option<NaiveDate>,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub is_receivable: Option<bool>,
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 255, message = "payer_name must be at most 255 characters"))]
    pub payer_name: Option<String>,
    pub interest_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddInstallmentsRequest {
    #[validate(length(min = 1, message = "installments must not be empty"))]
    pub installments: Vec<InstallmentInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListRevenuesParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub period: Option<Period>,
    pub reference_date: Option<NaiveDate>,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallmentView {
    #[serde(flatten)]
    pub installment: RevenueInstallment,
    pub effective_status: InstallmentStatus,
}

impl InstallmentView {
    pub fn new(installment: RevenueInstallment, today: NaiveDate) -> Self {
        let effective_status = installment.effective_status(today);
        Self {
            installment,
            effective_status,
        }
    }
}

/// A revenue record joined with its reference names and children.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueView {
    #[serde(flatten)]
    pub record: RevenueRecord,
    pub category_name: String,
    pub category_kind: CategoryKind,
    pub payment_status_name: String,
    pub payment_method_name: Option<String>,
    pub total_paid: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_loss: Option<BoundaryLossInfo>,
    pub installments: Vec<InstallmentView>,
    pub payments: Vec<RevenuePayment>,
    pub loan: Option<LoanDetail>,
    pub attachments: Vec<Attachment>,
}

/// A write result plus the post-commit effects that failed.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueResponse {
    #[serde(flatten)]
    pub revenue: RevenueView,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevenueListResponse {
    pub data: Vec<RevenueRecord>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}
