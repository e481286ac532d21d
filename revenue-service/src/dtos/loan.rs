use crate::models::{EmployeeRole, LoanDetail};
use crate::services::loan::ShareRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ShareInput {
    pub employee_id: Option<String>,
    #[validate(length(min = 1, max = 255, message = "employee_name must be 1-255 characters"))]
    pub employee_name: String,
    pub role: Option<EmployeeRole>,
    pub share_amount: Decimal,
}

impl From<ShareInput> for ShareRequest {
    fn from(input: ShareInput) -> Self {
        Self {
            employee_id: input.employee_id,
            employee_name: input.employee_name.trim().to_string(),
            role: input.role.unwrap_or(EmployeeRole::Other),
            share_amount: input.share_amount,
        }
    }
}

/// Optional manual split. Without shares the configured split is used.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoanRequest {
    #[validate(nested)]
    pub shares: Option<Vec<ShareInput>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanResponse {
    pub loan: Option<LoanDetail>,
}
