use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

/// Assignment payload as pushed by the Operations system. Amounts arrive as
/// numbers, numeric strings or null.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SyncAssignmentRequest {
    #[validate(length(min = 1, message = "assignment_id is required"))]
    pub assignment_id: String,
    #[validate(length(min = 1, message = "bus_trip_id is required"))]
    pub bus_trip_id: String,
    #[validate(length(min = 1, message = "assignment_type is required"))]
    pub assignment_type: String,
    #[serde(default)]
    pub assignment_value: serde_json::Value,
    #[serde(default)]
    pub trip_revenue: serde_json::Value,
    pub date_assigned: Option<NaiveDate>,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub conductor_id: Option<String>,
    pub conductor_name: Option<String>,
}
