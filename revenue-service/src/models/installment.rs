//! Revenue installment model for revenue-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Installment status. `Late` is never stored; see [`RevenueInstallment::effective_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
pub enum InstallmentStatus {
    Pending,
    Partial,
    Paid,
    Overpaid,
    Late,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Pending => "Pending",
            InstallmentStatus::Partial => "Partial",
            InstallmentStatus::Paid => "Paid",
            InstallmentStatus::Overpaid => "Overpaid",
            InstallmentStatus::Late => "Late",
        }
    }
}

impl std::fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One scheduled portion of a receivable revenue record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevenueInstallment {
    pub installment_id: Uuid,
    pub revenue_id: Uuid,
    pub installment_number: i32,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
    pub amount_paid: Decimal,
    pub status: InstallmentStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl RevenueInstallment {
    /// Amount still owed on this installment, floored at zero.
    pub fn remaining(&self) -> Decimal {
        (self.amount_due - self.amount_paid).max(Decimal::ZERO)
    }

    /// Stored status with the time-based `Late` overlay applied for `today`.
    pub fn effective_status(&self, today: NaiveDate) -> InstallmentStatus {
        match self.status {
            InstallmentStatus::Pending | InstallmentStatus::Partial if self.due_date < today => {
                InstallmentStatus::Late
            }
            status => status,
        }
    }
}

/// Input for inserting an installment.
#[derive(Debug, Clone)]
pub struct NewInstallment {
    pub revenue_id: Uuid,
    pub installment_number: i32,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
}
