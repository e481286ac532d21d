//! Installment and payment ledger: recalculates paid amounts, statuses and
//! outstanding balances, and guards against unintended overpayment.

use crate::models::{
    InstallmentStatus, NewPayment, PaymentMethod, PaymentStatus, RevenueInstallment,
    RevenuePayment, RevenueRecord,
};
use crate::services::store::StoreTx;
use crate::services::validation::RuleViolation;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

pub const STATUS_PAID: &str = "Paid";
pub const STATUS_PARTIALLY_PAID: &str = "Partially Paid";
pub const STATUS_OVERPAID: &str = "Overpaid";

/// Installment status as a pure function of what is due and what was paid.
pub fn derive_installment_status(amount_due: Decimal, amount_paid: Decimal) -> InstallmentStatus {
    if amount_paid <= Decimal::ZERO {
        InstallmentStatus::Pending
    } else if amount_paid < amount_due {
        InstallmentStatus::Partial
    } else if amount_paid == amount_due {
        InstallmentStatus::Paid
    } else {
        InstallmentStatus::Overpaid
    }
}

/// `max(0, round(total - paid, 4))`.
pub fn outstanding_after(total_amount: Decimal, total_paid: Decimal) -> Decimal {
    (total_amount - total_paid).round_dp(4).max(Decimal::ZERO)
}

/// Revenue-level status implied by the paid total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevenueStatusChange {
    Paid,
    PartiallyPaid,
    Overpaid,
    Unchanged,
}

pub fn derive_revenue_status(total_amount: Decimal, total_paid: Decimal) -> RevenueStatusChange {
    if total_amount <= Decimal::ZERO {
        return RevenueStatusChange::Unchanged;
    }
    if total_paid > total_amount {
        RevenueStatusChange::Overpaid
    } else if outstanding_after(total_amount, total_paid).is_zero() {
        RevenueStatusChange::Paid
    } else if total_paid > Decimal::ZERO {
        RevenueStatusChange::PartiallyPaid
    } else {
        RevenueStatusChange::Unchanged
    }
}

/// One payment line as submitted by a caller.
#[derive(Debug, Clone)]
pub struct PaymentLine {
    pub installment_id: Option<Uuid>,
    pub amount: Decimal,
    pub payment_method_id: Option<Uuid>,
    pub payment_status_id: Uuid,
    pub paid_date: NaiveDate,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
}

/// Look up a payment status that may be attached to revenue records.
pub async fn resolve_payment_status(
    tx: &mut dyn StoreTx,
    payment_status_id: Uuid,
) -> Result<PaymentStatus, AppError> {
    let status = tx
        .find_payment_status(payment_status_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "payment_status_id {} not found",
                payment_status_id
            ))
        })?;
    if !status.applies_to_revenue {
        return Err(RuleViolation::StatusNotApplicable(status.name).into());
    }
    Ok(status)
}

pub async fn resolve_payment_method(
    tx: &mut dyn StoreTx,
    payment_method_id: Uuid,
) -> Result<PaymentMethod, AppError> {
    tx.find_payment_method(payment_method_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "payment_method_id {} not found",
                payment_method_id
            ))
        })
}

/// Sum of everything counted as paid on a revenue record.
pub async fn total_paid(tx: &mut dyn StoreTx, revenue: &RevenueRecord) -> Result<Decimal, AppError> {
    Ok(revenue.remitted_amount + tx.sum_revenue_payments(revenue.revenue_id).await?)
}

/// Recompute an installment's paid amount and status from its payments.
pub async fn recalculate_installment(
    tx: &mut dyn StoreTx,
    installment: &RevenueInstallment,
) -> Result<RevenueInstallment, AppError> {
    let amount_paid = tx
        .sum_installment_payments(installment.installment_id)
        .await?;
    let status = derive_installment_status(installment.amount_due, amount_paid);
    tx.update_installment_progress(installment.installment_id, amount_paid, status)
        .await
}

/// Recompute a revenue record's outstanding balance and payment status.
pub async fn recalculate_revenue(
    tx: &mut dyn StoreTx,
    revenue: &RevenueRecord,
) -> Result<RevenueRecord, AppError> {
    let paid = total_paid(tx, revenue).await?;
    let mut updated = revenue.clone();
    updated.outstanding_balance = outstanding_after(revenue.total_amount, paid);

    let status_name = match derive_revenue_status(revenue.total_amount, paid) {
        RevenueStatusChange::Paid => Some(STATUS_PAID),
        RevenueStatusChange::PartiallyPaid => Some(STATUS_PARTIALLY_PAID),
        RevenueStatusChange::Overpaid => Some(STATUS_OVERPAID),
        RevenueStatusChange::Unchanged => None,
    };
    if let Some(name) = status_name {
        let mut status = tx.find_payment_status_by_name(name).await?;
        if status.is_none() && name == STATUS_OVERPAID {
            status = tx.find_payment_status_by_name(STATUS_PAID).await?;
        }
        if let Some(status) = status {
            updated.payment_status_id = status.payment_status_id;
        }
    }

    tx.update_revenue(&updated).await
}

struct ResolvedLine {
    line: PaymentLine,
    status: PaymentStatus,
}

async fn resolve_line(
    tx: &mut dyn StoreTx,
    line: PaymentLine,
    amount_field: &'static str,
) -> Result<ResolvedLine, AppError> {
    if line.amount <= Decimal::ZERO {
        return Err(RuleViolation::NonPositiveAmount(amount_field).into());
    }
    let method_id = line
        .payment_method_id
        .ok_or(RuleViolation::MissingField("payment_method_id"))?;
    resolve_payment_method(tx, method_id).await?;
    let status = resolve_payment_status(tx, line.payment_status_id).await?;
    Ok(ResolvedLine { line, status })
}

fn new_payment(revenue_id: Uuid, line: &PaymentLine) -> NewPayment {
    NewPayment {
        revenue_id,
        installment_id: line.installment_id,
        amount: line.amount,
        payment_method_id: line.payment_method_id,
        payment_status_id: line.payment_status_id,
        paid_date: line.paid_date,
        reference_number: line.reference_number.clone(),
        remarks: line.remarks.clone(),
    }
}

/// Result of a single installment payment.
#[derive(Debug, Clone)]
pub struct InstallmentPaymentOutcome {
    pub installment: RevenueInstallment,
    pub payment: RevenuePayment,
    pub revenue: RevenueRecord,
}

/// Record a payment against one installment. The owning revenue and then the
/// installment are locked before the overpay guard reads the balances.
#[instrument(skip(tx, line), fields(installment_id = %installment_id, amount = %line.amount))]
pub async fn record_installment_payment(
    tx: &mut dyn StoreTx,
    installment_id: Uuid,
    mut line: PaymentLine,
) -> Result<InstallmentPaymentOutcome, AppError> {
    let not_found =
        || AppError::NotFound(anyhow::anyhow!("Installment {} not found", installment_id));
    let owner = tx.find_installment(installment_id).await?.ok_or_else(not_found)?;
    let revenue = tx
        .lock_revenue(owner.revenue_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Revenue record not found")))?;
    let installment = tx.lock_installment(installment_id).await?.ok_or_else(not_found)?;

    line.installment_id = Some(installment_id);
    let resolved = resolve_line(tx, line, "pay_amount").await?;

    // Only the revenue balance caps a payment; paying ahead on one
    // installment leaves it Overpaid.
    if !resolved.status.is_overpaid() {
        let outstanding = outstanding_after(revenue.total_amount, total_paid(tx, &revenue).await?);
        if resolved.line.amount > outstanding {
            return Err(RuleViolation::Overpayment {
                amount: resolved.line.amount,
                outstanding,
            }
            .into());
        }
    }

    let payment = tx
        .insert_payment(&new_payment(revenue.revenue_id, &resolved.line))
        .await?;
    let installment = recalculate_installment(tx, &installment).await?;
    let revenue = recalculate_revenue(tx, &revenue).await?;

    info!(
        payment_id = %payment.payment_id,
        installment_status = %installment.status,
        outstanding = %revenue.outstanding_balance,
        "Installment payment recorded"
    );

    Ok(InstallmentPaymentOutcome {
        installment,
        payment,
        revenue,
    })
}

/// Record a batch of payment lines against one revenue record.
///
/// Every line is validated and the batch total is checked against the
/// outstanding balance before anything is written. Lines are then applied one
/// by one with a recalculation after each, all inside the caller's unit of
/// work, so a failure on any line leaves nothing behind.
#[instrument(skip(tx, lines), fields(revenue_id = %revenue_id, lines = lines.len()))]
pub async fn record_payment_batch(
    tx: &mut dyn StoreTx,
    revenue_id: Uuid,
    lines: Vec<PaymentLine>,
) -> Result<(Vec<RevenuePayment>, RevenueRecord), AppError> {
    if lines.is_empty() {
        return Err(RuleViolation::MissingField("payments").into());
    }
    let mut revenue = tx
        .lock_revenue(revenue_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Revenue record not found")))?;

    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(installment_id) = line.installment_id {
            let installment = tx.lock_installment(installment_id).await?;
            if installment.map(|i| i.revenue_id) != Some(revenue_id) {
                return Err(AppError::NotFound(anyhow::anyhow!(
                    "Installment {} not found on this revenue record",
                    installment_id
                )));
            }
        }
        resolved.push(resolve_line(tx, line, "amount").await?);
    }

    let batch_total: Decimal = resolved.iter().map(|r| r.line.amount).sum();
    let outstanding = outstanding_after(revenue.total_amount, total_paid(tx, &revenue).await?);
    let tagged_overpaid = resolved.iter().any(|r| r.status.is_overpaid());
    if batch_total > outstanding && !tagged_overpaid {
        return Err(RuleViolation::Overpayment {
            amount: batch_total,
            outstanding,
        }
        .into());
    }

    let mut payments = Vec::with_capacity(resolved.len());
    for entry in &resolved {
        let payment = tx
            .insert_payment(&new_payment(revenue_id, &entry.line))
            .await?;
        if let Some(installment_id) = entry.line.installment_id {
            if let Some(installment) = tx.lock_installment(installment_id).await? {
                recalculate_installment(tx, &installment).await?;
            }
        }
        revenue = recalculate_revenue(tx, &revenue).await?;
        payments.push(payment);
    }

    info!(
        payments = payments.len(),
        outstanding = %revenue.outstanding_balance,
        "Payment batch recorded"
    );

    Ok((payments, revenue))
}
