//! Business rule predicates for revenue records, installments and payments.
//!
//! Every check is a pure function over its inputs. "Today" and the window
//! length are passed in so the rules can be tested without a clock.

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

/// Rounding tolerance for sums of money that must match.
pub const SUM_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

pub const REMARKS_MIN_LEN: usize = 5;
pub const REMARKS_MAX_LEN: usize = 500;

/// A violated business rule. The message always names the offending field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleViolation {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{0} must be greater than 0")]
    NonPositiveAmount(&'static str),

    #[error("{0} must not be negative")]
    NegativeAmount(&'static str),

    #[error("{field} is not valid: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("collection_date {date} cannot be in the future")]
    CollectionDateInFuture { date: NaiveDate },

    #[error("collection_date {date} is before the earliest allowed date {earliest}")]
    CollectionDateTooOld { date: NaiveDate, earliest: NaiveDate },

    #[error("payment_method_id is required when the payment status is Paid")]
    PaymentMethodRequired,

    #[error("payment_status_id '{0}' does not apply to revenue records")]
    StatusNotApplicable(String),

    #[error("interest_rate must not be negative")]
    NegativeInterestRate,

    #[error("due_date {due_date} must be on or after collection_date {collection_date}")]
    DueDateBeforeCollection {
        due_date: NaiveDate,
        collection_date: NaiveDate,
    },

    #[error("remarks must be between 5 and 500 characters, got {0}")]
    RemarksLength(usize),

    #[error("total_amount {amount} must be greater than 0 and at most the trip revenue {trip_revenue}")]
    AmountOutsideTripBound {
        amount: Decimal,
        trip_revenue: Decimal,
    },

    #[error("installments amount_due total {actual} does not match total_amount {expected}")]
    InstallmentSumMismatch { expected: Decimal, actual: Decimal },

    #[error("shares total {actual} does not match the shortfall {expected}")]
    ShareSumMismatch { expected: Decimal, actual: Decimal },

    #[error("amount {amount} exceeds the outstanding balance {outstanding}; tag the payment as Overpaid to accept it")]
    Overpayment {
        amount: Decimal,
        outstanding: Decimal,
    },

    #[error("installments can only be added to a receivable revenue record")]
    NotReceivable,

    #[error("revenue record already has installments")]
    InstallmentsAlreadyExist,

    #[error("category_id: loan generation applies only to Boundary revenue records")]
    NotBoundary,

    #[error("assignment_id: loan generation requires a revenue record linked to an assignment")]
    MissingAssignment,
}

impl From<RuleViolation> for AppError {
    fn from(violation: RuleViolation) -> Self {
        AppError::BadRequest(anyhow::anyhow!(violation.to_string()))
    }
}

/// A collection date accepted when adding a record: no later than today and
/// no earlier than `window_months` before today.
pub fn validate_collection_date_for_add(
    date: NaiveDate,
    today: NaiveDate,
    window_months: u32,
) -> Result<(), RuleViolation> {
    validate_collection_window(date, today, today, window_months)
}

/// A collection date accepted when editing a record. The window is anchored
/// on the record's creation date instead of today.
pub fn validate_collection_date_for_edit(
    date: NaiveDate,
    created_utc: DateTime<Utc>,
    today: NaiveDate,
    window_months: u32,
) -> Result<(), RuleViolation> {
    validate_collection_window(date, created_utc.date_naive(), today, window_months)
}

fn validate_collection_window(
    date: NaiveDate,
    anchor: NaiveDate,
    today: NaiveDate,
    window_months: u32,
) -> Result<(), RuleViolation> {
    if date > today {
        return Err(RuleViolation::CollectionDateInFuture { date });
    }
    let earliest = anchor
        .checked_sub_months(Months::new(window_months))
        .unwrap_or(NaiveDate::MIN);
    if date < earliest {
        return Err(RuleViolation::CollectionDateTooOld { date, earliest });
    }
    Ok(())
}

/// A payment method must be present on remitted, non-receivable records whose
/// status is Paid.
pub fn validate_payment_method_required(
    total_amount: Decimal,
    is_receivable: bool,
    status_name: &str,
    payment_method_id: Option<uuid::Uuid>,
) -> Result<(), RuleViolation> {
    let is_paid = status_name.trim().eq_ignore_ascii_case("paid");
    if total_amount > Decimal::ZERO && !is_receivable && is_paid && payment_method_id.is_none() {
        return Err(RuleViolation::PaymentMethodRequired);
    }
    Ok(())
}

/// Receivable fields after validation, with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivableTerms {
    pub due_date: NaiveDate,
    pub payer_name: String,
    pub interest_rate: Decimal,
}

pub fn validate_receivable_fields(
    collection_date: NaiveDate,
    due_date: Option<NaiveDate>,
    payer_name: Option<&str>,
    interest_rate: Option<Decimal>,
) -> Result<ReceivableTerms, RuleViolation> {
    let due_date = due_date.ok_or(RuleViolation::MissingField("due_date"))?;
    let payer_name = payer_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or(RuleViolation::MissingField("payer_name"))?;
    let interest_rate = interest_rate.unwrap_or(Decimal::ZERO);
    if interest_rate < Decimal::ZERO {
        return Err(RuleViolation::NegativeInterestRate);
    }
    if due_date < collection_date {
        return Err(RuleViolation::DueDateBeforeCollection {
            due_date,
            collection_date,
        });
    }
    Ok(ReceivableTerms {
        due_date,
        payer_name: payer_name.to_string(),
        interest_rate,
    })
}

/// Returns the trimmed remarks.
pub fn validate_remarks(remarks: &str) -> Result<String, RuleViolation> {
    let trimmed = remarks.trim();
    let len = trimmed.chars().count();
    if !(REMARKS_MIN_LEN..=REMARKS_MAX_LEN).contains(&len) {
        return Err(RuleViolation::RemarksLength(len));
    }
    Ok(trimmed.to_string())
}

/// Installment amounts must be positive. A receivable shell (total 0) takes
/// its total from the installments; otherwise the installments must add up to
/// the record's total within [`SUM_TOLERANCE`]. Returns the effective total,
/// which is always the installment sum so the plan can be paid off exactly.
pub fn validate_installment_amounts(
    total_amount: Decimal,
    amounts: &[Decimal],
) -> Result<Decimal, RuleViolation> {
    if amounts.iter().any(|amount| *amount <= Decimal::ZERO) {
        return Err(RuleViolation::NonPositiveAmount("amount_due"));
    }
    let sum: Decimal = amounts.iter().copied().sum();
    if total_amount.is_zero() {
        return Ok(sum);
    }
    if (sum - total_amount).abs() > SUM_TOLERANCE {
        return Err(RuleViolation::InstallmentSumMismatch {
            expected: total_amount,
            actual: sum,
        });
    }
    Ok(sum)
}

/// Two money sums agree within [`SUM_TOLERANCE`].
pub fn sums_match(expected: Decimal, actual: Decimal) -> bool {
    (expected - actual).abs() <= SUM_TOLERANCE
}
