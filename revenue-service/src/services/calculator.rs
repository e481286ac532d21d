//! Expected-revenue arithmetic for bus trip assignments. No I/O.

use crate::models::{Assignment, CategoryKind};
use crate::services::validation::RuleViolation;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

/// Company revenue implied by an assignment under the given category.
///
/// Boundary yields `trip_revenue - assignment_value`, which is negative when
/// the boundary fee exceeds what the trip earned. Percentage treats
/// `assignment_value` as a fraction of `trip_revenue`. Anything else falls
/// back to the trip revenue itself.
pub fn compute_auto_amount(kind: CategoryKind, assignment: &Assignment) -> Decimal {
    match kind {
        CategoryKind::Boundary => assignment.trip_revenue - assignment.assignment_value,
        CategoryKind::Percentage => {
            (assignment.trip_revenue * assignment.assignment_value).round_dp(2)
        }
        CategoryKind::BusRental | CategoryKind::Other => assignment.trip_revenue,
    }
}

/// Cash a trip-derived record is booked as collected when the caller gives no
/// amount. A Boundary collector is taken to have remitted the fee, or the
/// whole trip revenue when the fee is larger; the structural loss is reported
/// separately by [`get_boundary_loss_info`]. Other categories use
/// [`compute_auto_amount`].
pub fn default_collected_amount(kind: CategoryKind, assignment: &Assignment) -> Decimal {
    match kind {
        CategoryKind::Boundary => assignment
            .assignment_value
            .min(assignment.trip_revenue)
            .max(Decimal::ZERO),
        _ => compute_auto_amount(kind, assignment),
    }
}

/// Structural loss of a boundary arrangement: the contractual fee itself is
/// larger than the trip revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundaryLossInfo {
    pub is_loss: bool,
    pub loss_amount: Decimal,
}

impl BoundaryLossInfo {
    pub fn none() -> Self {
        Self {
            is_loss: false,
            loss_amount: Decimal::ZERO,
        }
    }
}

pub fn get_boundary_loss_info(kind: CategoryKind, assignment: &Assignment) -> BoundaryLossInfo {
    if kind != CategoryKind::Boundary {
        return BoundaryLossInfo::none();
    }
    let auto = compute_auto_amount(kind, assignment);
    if auto < Decimal::ZERO {
        BoundaryLossInfo {
            is_loss: true,
            loss_amount: auto.abs(),
        }
    } else {
        BoundaryLossInfo::none()
    }
}

/// Trip-bound categories must record an amount in `(0, trip_revenue]`.
pub fn validate_amount_against_trip(
    kind: CategoryKind,
    amount: Decimal,
    trip_revenue: Decimal,
) -> Result<(), RuleViolation> {
    if !kind.is_trip_bound() {
        return Ok(());
    }
    if amount <= Decimal::ZERO || amount > trip_revenue {
        return Err(RuleViolation::AmountOutsideTripBound {
            amount,
            trip_revenue,
        });
    }
    Ok(())
}

/// Amounts a new or edited record is booked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedAmounts {
    pub total_amount: Decimal,
    pub remitted_amount: Decimal,
}

/// Derive the booked total and the cash counted as already remitted.
///
/// A Boundary trip is booked at the larger of the collected amount and the
/// boundary fee, with only the collected cash remitted, so a shortfall stays
/// outstanding. Receivables start with nothing remitted. Other records whose
/// status says they are settled count whatever `paid_by_payments` does not
/// already cover as remitted.
pub fn booked_amounts(
    kind: CategoryKind,
    assignment: Option<&Assignment>,
    collected: Decimal,
    is_receivable: bool,
    status_settled: bool,
    paid_by_payments: Decimal,
) -> BookedAmounts {
    if is_receivable {
        return BookedAmounts {
            total_amount: collected,
            remitted_amount: Decimal::ZERO,
        };
    }
    match assignment {
        Some(assignment) if kind == CategoryKind::Boundary => BookedAmounts {
            total_amount: collected.max(assignment.assignment_value),
            remitted_amount: collected,
        },
        _ => BookedAmounts {
            total_amount: collected,
            remitted_amount: if status_settled {
                (collected - paid_by_payments).max(Decimal::ZERO)
            } else {
                Decimal::ZERO
            },
        },
    }
}

/// Parse a loosely typed JSON amount. Numbers and numeric strings are
/// accepted; anything else becomes zero.
pub fn parse_amount_lenient(value: &serde_json::Value) -> Decimal {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Decimal::from(i)
            } else {
                Decimal::from_str(&n.to_string())
                    .ok()
                    .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                    .unwrap_or(Decimal::ZERO)
            }
        }
        serde_json::Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            Decimal::from_str(&cleaned)
                .or_else(|_| Decimal::from_scientific(&cleaned))
                .unwrap_or(Decimal::ZERO)
        }
        _ => Decimal::ZERO,
    }
}
