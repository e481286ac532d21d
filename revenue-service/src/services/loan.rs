//! Boundary shortage loans: split the shortfall between employees, cap it at
//! the revenue's outstanding balance and lay out each share's repayments.

use crate::models::{
    Assignment, BoundaryLoan, CategoryKind, EmployeeRole, InstallmentFrequency, LoanDetail,
    LoanInstallment, LoanShare, LoanShareDetail, RevenueRecord, SystemConfig,
};
use crate::services::store::StoreTx;
use crate::services::validation::{sums_match, RuleViolation};
use chrono::{NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

/// Gap between the boundary fee and what the collector remitted.
///
/// Not to be confused with [`crate::services::calculator::get_boundary_loss_info`],
/// which compares the fee against trip revenue.
pub fn boundary_shortfall(assignment_value: Decimal, collected: Decimal) -> Decimal {
    (assignment_value - collected).max(Decimal::ZERO)
}

/// One employee's requested share of a shortage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShareRequest {
    pub employee_id: Option<String>,
    pub employee_name: String,
    pub role: EmployeeRole,
    pub share_amount: Decimal,
}

/// Split `shortfall` between the assignment's driver and conductor using the
/// configured percentages. Without a conductor the driver carries all of it.
pub fn default_shares(
    assignment: &Assignment,
    shortfall: Decimal,
    config: &SystemConfig,
) -> Vec<ShareRequest> {
    let driver = ShareRequest {
        employee_id: assignment.driver_id.clone(),
        employee_name: assignment
            .driver_name
            .clone()
            .unwrap_or_else(|| "Driver".to_string()),
        role: EmployeeRole::Driver,
        share_amount: shortfall,
    };

    let has_conductor = assignment.conductor_id.is_some() || assignment.conductor_name.is_some();
    if !has_conductor {
        return vec![driver];
    }

    let weight_total = config.driver_share_pct + config.conductor_share_pct;
    let driver_fraction = if weight_total > Decimal::ZERO {
        config.driver_share_pct / weight_total
    } else {
        Decimal::new(5, 1)
    };
    let driver_amount = (shortfall * driver_fraction).round_dp(2);

    vec![
        ShareRequest {
            share_amount: driver_amount,
            ..driver
        },
        ShareRequest {
            employee_id: assignment.conductor_id.clone(),
            employee_name: assignment
                .conductor_name
                .clone()
                .unwrap_or_else(|| "Conductor".to_string()),
            role: EmployeeRole::Conductor,
            share_amount: shortfall - driver_amount,
        },
    ]
}

/// Manually entered shares must be positive, named, and sum to the shortfall.
pub fn validate_manual_shares(
    shares: &[ShareRequest],
    shortfall: Decimal,
) -> Result<(), RuleViolation> {
    if shares.is_empty() {
        return Err(RuleViolation::MissingField("shares"));
    }
    for share in shares {
        if share.employee_name.trim().is_empty() {
            return Err(RuleViolation::MissingField("employee_name"));
        }
        if share.share_amount <= Decimal::ZERO {
            return Err(RuleViolation::NonPositiveAmount("share_amount"));
        }
    }
    let actual: Decimal = shares.iter().map(|s| s.share_amount).sum();
    if !sums_match(shortfall, actual) {
        return Err(RuleViolation::ShareSumMismatch {
            expected: shortfall,
            actual,
        });
    }
    Ok(())
}

/// Rescale shares proportionally so they sum exactly to `target`. The last
/// share absorbs rounding.
pub fn scale_shares(shares: &[ShareRequest], target: Decimal) -> Vec<ShareRequest> {
    let current: Decimal = shares.iter().map(|s| s.share_amount).sum();
    if shares.is_empty() || current == target {
        return shares.to_vec();
    }

    let mut scaled = Vec::with_capacity(shares.len());
    let mut allocated = Decimal::ZERO;
    for (index, share) in shares.iter().enumerate() {
        let amount = if index + 1 == shares.len() {
            target - allocated
        } else if current.is_zero() {
            (target / Decimal::from(shares.len() as u64)).round_dp(2)
        } else {
            (share.share_amount * target / current).round_dp(2)
        };
        allocated += amount;
        scaled.push(ShareRequest {
            share_amount: amount,
            ..share.clone()
        });
    }
    scaled
}

/// Equal repayments of `amount`, the first one period after `start`. The last
/// installment absorbs rounding so the schedule sums to `amount`.
pub fn build_schedule(
    amount: Decimal,
    count: u32,
    frequency: InstallmentFrequency,
    start: NaiveDate,
) -> Vec<(i32, NaiveDate, Decimal)> {
    if amount <= Decimal::ZERO {
        return Vec::new();
    }
    let count = count.max(1);
    let base = (amount / Decimal::from(count)).round_dp_with_strategy(2, RoundingStrategy::ToZero);

    let mut schedule = Vec::with_capacity(count as usize);
    let mut allocated = Decimal::ZERO;
    for number in 1..=count {
        let due = if number == count {
            amount - allocated
        } else {
            base
        };
        allocated += due;
        let due_date = frequency.advance(start, number).unwrap_or(start);
        schedule.push((number as i32, due_date, due));
    }
    schedule
}

/// Amounts recorded on the loan row.
#[derive(Debug, Clone, Copy)]
struct LoanFigures {
    assignment_value: Decimal,
    trip_revenue: Decimal,
    shortage: Decimal,
    principal: Decimal,
}

/// Assemble a loan with shares and schedules, keeping the identity of an
/// existing loan for the same revenue.
fn assemble_loan(
    existing: Option<&LoanDetail>,
    revenue: &RevenueRecord,
    figures: LoanFigures,
    shares: &[ShareRequest],
    config: &SystemConfig,
) -> LoanDetail {
    let now = Utc::now();
    let loan_id = existing.map(|l| l.loan.loan_id).unwrap_or_else(Uuid::new_v4);
    let created_utc = existing.map(|l| l.loan.created_utc).unwrap_or(now);
    let count = config.default_installment_count.max(1) as u32;
    let frequency = config.frequency();

    let shares = shares
        .iter()
        .map(|request| {
            let share_id = Uuid::new_v4();
            let installments = build_schedule(
                request.share_amount,
                count,
                frequency,
                revenue.collection_date,
            )
            .into_iter()
            .map(|(installment_number, due_date, amount_due)| LoanInstallment {
                loan_installment_id: Uuid::new_v4(),
                share_id,
                loan_id,
                installment_number,
                due_date,
                amount_due,
            })
            .collect();
            LoanShareDetail {
                share: LoanShare {
                    share_id,
                    loan_id,
                    employee_id: request.employee_id.clone(),
                    employee_name: request.employee_name.clone(),
                    role: request.role.as_str().to_string(),
                    share_amount: request.share_amount,
                },
                installments,
            }
        })
        .collect();

    LoanDetail {
        loan: BoundaryLoan {
            loan_id,
            revenue_id: revenue.revenue_id,
            assignment_id: revenue.assignment_id.clone(),
            assignment_value: figures.assignment_value,
            trip_revenue: figures.trip_revenue,
            total_amount: revenue.remitted_amount,
            shortage: figures.shortage,
            principal: figures.principal,
            created_utc,
            updated_utc: now,
        },
        shares,
    }
}

impl From<&BoundaryLoan> for LoanFigures {
    fn from(loan: &BoundaryLoan) -> Self {
        Self {
            assignment_value: loan.assignment_value,
            trip_revenue: loan.trip_revenue,
            shortage: loan.shortage,
            principal: loan.principal,
        }
    }
}

fn requests_from(detail: &LoanDetail) -> Vec<ShareRequest> {
    detail
        .shares
        .iter()
        .map(|entry| ShareRequest {
            employee_id: entry.share.employee_id.clone(),
            employee_name: entry.share.employee_name.clone(),
            role: entry.share.parsed_role(),
            share_amount: entry.share.share_amount,
        })
        .collect()
}

/// Revenue and assignment a boundary loan hangs off, checked for eligibility.
pub struct LoanContext {
    pub revenue: RevenueRecord,
    pub assignment: Assignment,
}

/// Lock the revenue and confirm it is an assignment-linked Boundary record.
pub async fn load_loan_context(
    tx: &mut dyn StoreTx,
    revenue_id: Uuid,
) -> Result<LoanContext, AppError> {
    let revenue = tx
        .lock_revenue(revenue_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Revenue record not found")))?;
    let category = tx
        .find_category(revenue.category_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Category not found")))?;
    if category.kind() != CategoryKind::Boundary {
        return Err(RuleViolation::NotBoundary.into());
    }
    let assignment_id = revenue
        .assignment_id
        .clone()
        .ok_or(RuleViolation::MissingAssignment)?;
    let assignment = tx.find_assignment(&assignment_id).await?.ok_or_else(|| {
        AppError::NotFound(anyhow::anyhow!("Assignment {} not found", assignment_id))
    })?;
    Ok(LoanContext {
        revenue,
        assignment,
    })
}

/// Create or update the shortage loan of a Boundary revenue record.
///
/// Manual shares replace the current split and must sum to the shortfall.
/// Without them an existing split is kept proportionally, or the configured
/// driver/conductor split is used for a new loan. The principal is the
/// shortfall capped at the outstanding balance. Returns `None` when there is
/// no shortfall and no loan yet.
#[instrument(skip(tx, manual_shares), fields(revenue_id = %revenue_id))]
pub async fn upsert_boundary_loan_for_revenue(
    tx: &mut dyn StoreTx,
    revenue_id: Uuid,
    manual_shares: Option<Vec<ShareRequest>>,
) -> Result<Option<LoanDetail>, AppError> {
    let LoanContext {
        revenue,
        assignment,
    } = load_loan_context(tx, revenue_id).await?;

    let shortage = boundary_shortfall(assignment.assignment_value, revenue.remitted_amount);
    if let Some(shares) = &manual_shares {
        validate_manual_shares(shares, shortage)?;
    }

    let existing = tx.find_loan(revenue_id).await?;
    if shortage.is_zero() && existing.is_none() {
        return Ok(None);
    }

    let config = tx.load_system_config().await?;
    let principal = shortage.min(revenue.outstanding_balance);

    let base = match (manual_shares, &existing) {
        (Some(shares), _) => shares,
        (None, Some(loan))
            if loan
                .shares
                .iter()
                .any(|s| s.share.share_amount > Decimal::ZERO) =>
        {
            requests_from(loan)
        }
        _ => default_shares(&assignment, shortage, &config),
    };
    let shares = scale_shares(&base, principal);

    let figures = LoanFigures {
        assignment_value: assignment.assignment_value,
        trip_revenue: assignment.trip_revenue,
        shortage,
        principal,
    };
    let detail = assemble_loan(existing.as_ref(), &revenue, figures, &shares, &config);
    tx.save_loan(&detail).await?;

    info!(
        loan_id = %detail.loan.loan_id,
        shortage = %shortage,
        principal = %principal,
        shares = detail.shares.len(),
        "Boundary loan upserted"
    );

    Ok(Some(detail))
}

/// Reduce an existing loan whose principal exceeds the revenue's outstanding
/// balance. Loans within the balance are left untouched.
#[instrument(skip(tx), fields(revenue_id = %revenue_id))]
pub async fn clamp_loan_to_outstanding(
    tx: &mut dyn StoreTx,
    revenue_id: Uuid,
) -> Result<Option<LoanDetail>, AppError> {
    let Some(revenue) = tx.lock_revenue(revenue_id).await? else {
        return Ok(None);
    };
    let Some(existing) = tx.find_loan(revenue_id).await? else {
        return Ok(None);
    };
    if existing.loan.principal <= revenue.outstanding_balance {
        return Ok(Some(existing));
    }

    let principal = revenue.outstanding_balance;
    let config = tx.load_system_config().await?;
    let shares = scale_shares(&requests_from(&existing), principal);
    let figures = LoanFigures {
        principal,
        ..LoanFigures::from(&existing.loan)
    };
    let detail = assemble_loan(Some(&existing), &revenue, figures, &shares, &config);
    tx.save_loan(&detail).await?;

    info!(
        loan_id = %detail.loan.loan_id,
        from = %existing.loan.principal,
        to = %principal,
        "Boundary loan clamped to outstanding balance"
    );

    Ok(Some(detail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn assignment(conductor: bool) -> Assignment {
        Assignment {
            assignment_id: "ASG-1".to_string(),
            bus_trip_id: "TRIP-1".to_string(),
            assignment_type: "Boundary".to_string(),
            assignment_value: dec!(2000),
            trip_revenue: dec!(2200),
            date_assigned: None,
            driver_id: Some("EMP-D".to_string()),
            driver_name: Some("Dario".to_string()),
            conductor_id: conductor.then(|| "EMP-C".to_string()),
            conductor_name: conductor.then(|| "Cora".to_string()),
            synced_utc: Utc::now(),
        }
    }

    fn share(name: &str, amount: Decimal) -> ShareRequest {
        ShareRequest {
            employee_id: None,
            employee_name: name.to_string(),
            role: EmployeeRole::Other,
            share_amount: amount,
        }
    }

    #[test]
    fn test_shortfall_is_floored() {
        assert_eq!(boundary_shortfall(dec!(2000), dec!(1800)), dec!(200));
        assert_eq!(boundary_shortfall(dec!(2000), dec!(2100)), Decimal::ZERO);
    }

    #[test]
    fn test_default_split_fifty_fifty() {
        let shares = default_shares(&assignment(true), dec!(200), &SystemConfig::default());
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].role, EmployeeRole::Driver);
        assert_eq!(shares[0].share_amount, dec!(100));
        assert_eq!(shares[1].role, EmployeeRole::Conductor);
        assert_eq!(shares[1].share_amount, dec!(100));
    }

    #[test]
    fn test_default_split_uneven_and_driver_only() {
        let config = SystemConfig {
            driver_share_pct: dec!(70),
            conductor_share_pct: dec!(30),
            ..SystemConfig::default()
        };
        let shares = default_shares(&assignment(true), dec!(100.01), &config);
        assert_eq!(shares[0].share_amount, dec!(70.01));
        assert_eq!(shares[1].share_amount, dec!(30.00));

        let solo = default_shares(&assignment(false), dec!(200), &config);
        assert_eq!(solo.len(), 1);
        assert_eq!(solo[0].share_amount, dec!(200));
    }

    #[test]
    fn test_manual_shares_must_sum_to_shortfall() {
        let ok = vec![share("A", dec!(120)), share("B", dec!(79.995))];
        assert!(validate_manual_shares(&ok, dec!(200)).is_ok());

        let short = vec![share("A", dec!(120)), share("B", dec!(70))];
        assert!(matches!(
            validate_manual_shares(&short, dec!(200)),
            Err(RuleViolation::ShareSumMismatch { .. })
        ));
        assert_eq!(
            validate_manual_shares(&[share("A", dec!(0)), share("B", dec!(200))], dec!(200)),
            Err(RuleViolation::NonPositiveAmount("share_amount"))
        );
    }

    #[test]
    fn test_scale_shares_preserves_total() {
        let shares = vec![share("A", dec!(100)), share("B", dec!(100)), share("C", dec!(100))];
        let scaled = scale_shares(&shares, dec!(100));
        let total: Decimal = scaled.iter().map(|s| s.share_amount).sum();
        assert_eq!(total, dec!(100));
        assert_eq!(scaled[0].share_amount, dec!(33.33));
        assert_eq!(scaled[2].share_amount, dec!(33.34));
    }

    #[test]
    fn test_schedule_last_installment_absorbs_rounding() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let schedule = build_schedule(dec!(100), 3, InstallmentFrequency::Weekly, start);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule[0], (1, NaiveDate::from_ymd_opt(2026, 3, 8).unwrap(), dec!(33.33)));
        assert_eq!(schedule[2].2, dec!(33.34));
        let total: Decimal = schedule.iter().map(|(_, _, amount)| *amount).sum();
        assert_eq!(total, dec!(100));

        assert!(build_schedule(Decimal::ZERO, 3, InstallmentFrequency::Weekly, start).is_empty());
    }
}
