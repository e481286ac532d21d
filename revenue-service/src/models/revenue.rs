//! Revenue record model for revenue-service.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One bus-trip or manual revenue transaction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RevenueRecord {
    pub revenue_id: Uuid,
    pub revenue_code: String,
    pub assignment_id: Option<String>,
    pub bus_trip_id: Option<String>,
    pub category_id: Uuid,
    pub total_amount: Decimal,
    pub remitted_amount: Decimal,
    pub collection_date: NaiveDate,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub is_receivable: bool,
    pub due_date: Option<NaiveDate>,
    pub payer_name: Option<String>,
    pub interest_rate: Decimal,
    pub outstanding_balance: Decimal,
    pub remarks: String,
    pub is_deleted: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for inserting a revenue record.
#[derive(Debug, Clone)]
pub struct NewRevenue {
    pub assignment_id: Option<String>,
    pub bus_trip_id: Option<String>,
    pub category_id: Uuid,
    pub total_amount: Decimal,
    pub remitted_amount: Decimal,
    pub collection_date: NaiveDate,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub is_receivable: bool,
    pub due_date: Option<NaiveDate>,
    pub payer_name: Option<String>,
    pub interest_rate: Decimal,
    pub outstanding_balance: Decimal,
    pub remarks: String,
}

/// Named listing periods, anchored on a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    #[serde(alias = "day")]
    Day,
    #[serde(alias = "month")]
    Month,
    #[serde(alias = "year")]
    Year,
}

impl Period {
    /// Inclusive date range of the period containing `reference`.
    pub fn range(&self, reference: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Period::Day => (reference, reference),
            Period::Month => {
                let start = reference.with_day(1).unwrap_or(reference);
                let end = start
                    .checked_add_months(chrono::Months::new(1))
                    .and_then(|d| d.pred_opt())
                    .unwrap_or(reference);
                (start, end)
            }
            Period::Year => {
                let start = NaiveDate::from_ymd_opt(reference.year(), 1, 1).unwrap_or(reference);
                let end = NaiveDate::from_ymd_opt(reference.year(), 12, 31).unwrap_or(reference);
                (start, end)
            }
        }
    }
}

/// Sort keys accepted by the listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Code,
    #[default]
    Date,
    Amount,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Code => "revenue_code",
            SortField::Date => "collection_date",
            SortField::Amount => "total_amount",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter parameters for listing revenue records. Soft-deleted rows are
/// always excluded.
#[derive(Debug, Clone)]
pub struct ListRevenuesFilter {
    pub category_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl ListRevenuesFilter {
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.limit as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_ranges() {
        let reference = NaiveDate::from_ymd_opt(2024, 2, 17).unwrap();
        assert_eq!(Period::Day.range(reference), (reference, reference));
        assert_eq!(
            Period::Month.range(reference),
            (
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
            )
        );
        assert_eq!(
            Period::Year.range(reference),
            (
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
            )
        );
    }
}
