use crate::dtos::InstallmentView;
use crate::models::RevenuePayment;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordInstallmentPaymentRequest {
    pub pay_amount: Option<Decimal>,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    /// Defaults to today.
    pub paid_date: Option<NaiveDate>,
    #[validate(length(max = 100, message = "reference_number must be at most 100 characters"))]
    pub reference_number: Option<String>,
    #[validate(length(max = 500, message = "remarks must be at most 500 characters"))]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentLineRequest {
    pub installment_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub paid_date: Option<NaiveDate>,
    #[validate(length(max = 100, message = "reference_number must be at most 100 characters"))]
    pub reference_number: Option<String>,
    #[validate(length(max = 500, message = "remarks must be at most 500 characters"))]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BatchPaymentRequest {
    #[validate(length(min = 1, message = "payments must not be empty"))]
    pub payments: Vec<PaymentLineRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallmentPaymentResponse {
    pub installment: InstallmentView,
    pub payment: RevenuePayment,
    pub outstanding_balance: Decimal,
    pub payment_status_id: Uuid,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchPaymentResponse {
    pub payments: Vec<RevenuePayment>,
    pub outstanding_balance: Decimal,
    pub payment_status_id: Uuid,
    pub warnings: Vec<String>,
}
