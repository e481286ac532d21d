//! Externally owned reference data: categories, payment metadata, assignments
//! mirrored from Operations, and the system configuration row.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Revenue category kind, derived from the category name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    Boundary,
    Percentage,
    BusRental,
    Other,
}

impl CategoryKind {
    /// Normalise a category or assignment type name: underscores become
    /// spaces, surrounding whitespace is dropped, comparison ignores case.
    pub fn from_name(name: &str) -> Self {
        let normalized = name.replace('_', " ");
        let normalized = normalized.trim();
        if normalized.eq_ignore_ascii_case("boundary") {
            CategoryKind::Boundary
        } else if normalized.eq_ignore_ascii_case("percentage") {
            CategoryKind::Percentage
        } else if normalized.eq_ignore_ascii_case("bus rental") {
            CategoryKind::BusRental
        } else {
            CategoryKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Boundary => "Boundary",
            CategoryKind::Percentage => "Percentage",
            CategoryKind::BusRental => "Bus Rental",
            CategoryKind::Other => "Other",
        }
    }

    /// Categories whose amount is bounded by the linked trip's revenue.
    pub fn is_trip_bound(&self) -> bool {
        matches!(
            self,
            CategoryKind::Boundary | CategoryKind::Percentage | CategoryKind::BusRental
        )
    }
}

/// Revenue category.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl Category {
    pub fn kind(&self) -> CategoryKind {
        CategoryKind::from_name(&self.name)
    }
}

/// Payment method (cash, bank transfer, e-wallet, ...).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentMethod {
    pub payment_method_id: Uuid,
    pub name: String,
}

/// Payment status shared across modules; only rows flagged for the revenue
/// module may be attached to revenue records and payments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentStatus {
    pub payment_status_id: Uuid,
    pub name: String,
    pub applies_to_revenue: bool,
}

impl PaymentStatus {
    pub fn is_paid(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case("paid")
    }

    pub fn is_overpaid(&self) -> bool {
        self.name.trim().eq_ignore_ascii_case("overpaid")
    }
}

/// Bus trip assignment mirrored from the Operations system.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub assignment_id: String,
    pub bus_trip_id: String,
    pub assignment_type: String,
    pub assignment_value: Decimal,
    pub trip_revenue: Decimal,
    pub date_assigned: Option<NaiveDate>,
    pub driver_id: Option<String>,
    pub driver_name: Option<String>,
    pub conductor_id: Option<String>,
    pub conductor_name: Option<String>,
    pub synced_utc: DateTime<Utc>,
}

impl Assignment {
    pub fn kind(&self) -> CategoryKind {
        CategoryKind::from_name(&self.assignment_type)
    }
}

/// Spacing of generated installment due dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallmentFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl InstallmentFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentFrequency::Daily => "Daily",
            InstallmentFrequency::Weekly => "Weekly",
            InstallmentFrequency::Monthly => "Monthly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => InstallmentFrequency::Daily,
            "monthly" => InstallmentFrequency::Monthly,
            _ => InstallmentFrequency::Weekly,
        }
    }

    /// Date `periods` intervals after `start`.
    pub fn advance(&self, start: NaiveDate, periods: u32) -> Option<NaiveDate> {
        match self {
            InstallmentFrequency::Daily => start.checked_add_days(Days::new(periods as u64)),
            InstallmentFrequency::Weekly => {
                start.checked_add_days(Days::new(7 * periods as u64))
            }
            InstallmentFrequency::Monthly => start.checked_add_months(Months::new(periods)),
        }
    }
}

/// Admin-editable defaults for shortage loans.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemConfig {
    pub driver_share_pct: Decimal,
    pub conductor_share_pct: Decimal,
    pub default_installment_count: i32,
    pub installment_frequency: String,
}

impl SystemConfig {
    pub fn frequency(&self) -> InstallmentFrequency {
        InstallmentFrequency::from_string(&self.installment_frequency)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            driver_share_pct: Decimal::from(50),
            conductor_share_pct: Decimal::from(50),
            default_installment_count: 3,
            installment_frequency: InstallmentFrequency::Weekly.as_str().to_string(),
        }
    }
}
