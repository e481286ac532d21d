//! Revenue payment model for revenue-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One recorded remittance. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevenuePayment {
    pub payment_id: Uuid,
    pub revenue_id: Uuid,
    pub installment_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub paid_date: NaiveDate,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for inserting a payment line.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub revenue_id: Uuid,
    pub installment_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub paid_date: NaiveDate,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
}
