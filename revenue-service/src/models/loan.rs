//! Boundary shortage loan model: one loan per revenue record, split into
//! employee shares, each with its own repayment schedule.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role of the employee carrying a share of the shortage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmployeeRole {
    Driver,
    Conductor,
    Other,
}

impl EmployeeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmployeeRole::Driver => "driver",
            EmployeeRole::Conductor => "conductor",
            EmployeeRole::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "driver" => EmployeeRole::Driver,
            "conductor" => EmployeeRole::Conductor,
            _ => EmployeeRole::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BoundaryLoan {
    pub loan_id: Uuid,
    pub revenue_id: Uuid,
    pub assignment_id: Option<String>,
    pub assignment_value: Decimal,
    pub trip_revenue: Decimal,
    /// Amount the collector actually remitted.
    pub total_amount: Decimal,
    pub shortage: Decimal,
    /// Shortage clamped to the revenue's outstanding balance.
    pub principal: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoanShare {
    pub share_id: Uuid,
    pub loan_id: Uuid,
    pub employee_id: Option<String>,
    pub employee_name: String,
    pub role: String,
    pub share_amount: Decimal,
}

impl LoanShare {
    pub fn parsed_role(&self) -> EmployeeRole {
        EmployeeRole::from_string(&self.role)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoanInstallment {
    pub loan_installment_id: Uuid,
    pub share_id: Uuid,
    pub loan_id: Uuid,
    pub installment_number: i32,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanShareDetail {
    #[serde(flatten)]
    pub share: LoanShare,
    pub installments: Vec<LoanInstallment>,
}

/// A loan with its shares and schedules.
#[derive(Debug, Clone, Serialize)]
pub struct LoanDetail {
    #[serde(flatten)]
    pub loan: BoundaryLoan,
    pub shares: Vec<LoanShareDetail>,
}
