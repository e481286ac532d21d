//! Revenue orchestrator: the create/update workflow and the read side.
//!
//! Each operation runs its primary writes in one unit of work. Loan
//! maintenance runs afterwards as a post-commit hook in its own unit of work;
//! a failing hook is logged and reported in the response's `warnings`.
//! Attachments are uploaded after the revenue commit and undone by an
//! explicit compensation sequence when any upload fails.

use crate::dtos::{
    AddInstallmentsRequest, AttachmentUpload, BatchPaymentRequest, BatchPaymentResponse,
    CreateRevenueRequest, InstallmentInput, InstallmentPaymentResponse, InstallmentView,
    ListRevenuesParams, RecordInstallmentPaymentRequest, RevenueResponse,
    RevenueView, SyncAssignmentRequest, UpdateRevenueRequest,
};
use crate::models::{
    Assignment, Category, CategoryKind, ListRevenuesFilter, LoanDetail, NewAttachment,
    NewInstallment, NewRevenue, RevenueRecord,
};
use crate::services::calculator::{
    booked_amounts, default_collected_amount, get_boundary_loss_info, parse_amount_lenient,
    validate_amount_against_trip,
};
use crate::services::ledger::{self, PaymentLine};
use crate::services::loan::{self, ShareRequest};
use crate::services::metrics::{
    record_loan_upsert, record_payment, record_revenue_operation, record_secondary_failure,
};
use crate::services::storage::AttachmentStorage;
use crate::services::store::{RevenueStore, StoreTx};
use crate::services::validation::{
    validate_collection_date_for_add, validate_collection_date_for_edit,
    validate_installment_amounts, validate_payment_method_required, validate_receivable_fields,
    validate_remarks, RuleViolation,
};
use base64::Engine;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// Which loan maintenance a write needs once it has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoanHook {
    Upsert,
    Clamp,
}

impl LoanHook {
    fn as_str(&self) -> &'static str {
        match self {
            LoanHook::Upsert => "upsert",
            LoanHook::Clamp => "clamp",
        }
    }
}

struct DecodedAttachment {
    file_name: String,
    content_type: String,
    data: Vec<u8>,
}

#[derive(Clone)]
pub struct RevenueService {
    store: Arc<dyn RevenueStore>,
    storage: Arc<dyn AttachmentStorage>,
    window_months: u32,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn not_found(what: &str, id: impl std::fmt::Display) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} {} not found", what, id))
}

/// What the collector handed over for an existing record.
fn collected_amount(record: &RevenueRecord, kind: CategoryKind) -> Decimal {
    if record.assignment_id.is_some() && kind == CategoryKind::Boundary && !record.is_receivable {
        record.remitted_amount
    } else {
        record.total_amount
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

fn decode_attachments(uploads: &[AttachmentUpload]) -> Result<Vec<DecodedAttachment>, AppError> {
    uploads
        .iter()
        .enumerate()
        .map(|(index, upload)| {
            let data = base64::engine::general_purpose::STANDARD
                .decode(upload.content_base64.trim())
                .map_err(|e| RuleViolation::InvalidField {
                    field: format!("attachments[{}].content_base64", index),
                    reason: e.to_string(),
                })?;
            if data.len() > MAX_ATTACHMENT_BYTES {
                return Err(RuleViolation::InvalidField {
                    field: format!("attachments[{}]", index),
                    reason: "file exceeds 10MB".to_string(),
                }
                .into());
            }
            Ok(DecodedAttachment {
                file_name: sanitize_file_name(&upload.file_name),
                content_type: upload
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data,
            })
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn payment_line(
    installment_id: Option<Uuid>,
    amount: Option<Decimal>,
    amount_field: &'static str,
    payment_method_id: Option<Uuid>,
    payment_status_id: Uuid,
    paid_date: Option<NaiveDate>,
    reference_number: Option<String>,
    remarks: Option<String>,
) -> Result<PaymentLine, RuleViolation> {
    Ok(PaymentLine {
        installment_id,
        amount: amount.ok_or(RuleViolation::MissingField(amount_field))?,
        payment_method_id,
        payment_status_id,
        paid_date: paid_date.unwrap_or_else(today),
        reference_number,
        remarks,
    })
}

async fn find_category(tx: &mut dyn StoreTx, category_id: Uuid) -> Result<Category, AppError> {
    tx.find_category(category_id)
        .await?
        .ok_or_else(|| not_found("Category", category_id))
}

async fn find_assignment(
    tx: &mut dyn StoreTx,
    assignment_id: &str,
) -> Result<Assignment, AppError> {
    tx.find_assignment(assignment_id)
        .await?
        .ok_or_else(|| not_found("Assignment", assignment_id))
}

/// Reject a record that would duplicate a live one. The business key is
/// locked first so concurrent writers of the same key serialise.
async fn ensure_unique(
    tx: &mut dyn StoreTx,
    assignment_id: Option<&str>,
    category_id: Uuid,
    total_amount: Decimal,
    collection_date: NaiveDate,
    exclude: Option<Uuid>,
) -> Result<(), AppError> {
    let duplicate = match assignment_id {
        Some(assignment_id) => {
            tx.lock_key(&format!(
                "revenue:{}:{}:{}",
                assignment_id, collection_date, category_id
            ))
            .await?;
            tx.find_assignment_duplicate(assignment_id, collection_date, category_id, exclude)
                .await?
        }
        None => {
            tx.lock_key(&format!(
                "revenue-manual:{}:{}:{}",
                category_id,
                total_amount.normalize(),
                collection_date
            ))
            .await?;
            tx.find_manual_duplicate(category_id, total_amount, collection_date, exclude)
                .await?
        }
    };
    match duplicate {
        Some(existing) => Err(AppError::Conflict(anyhow::anyhow!(
            "Duplicate transaction: {} already records this collection",
            existing.revenue_code
        ))),
        None => Ok(()),
    }
}

async fn insert_installments(
    tx: &mut dyn StoreTx,
    revenue_id: Uuid,
    installments: &[InstallmentInput],
) -> Result<(), AppError> {
    for (index, input) in installments.iter().enumerate() {
        tx.insert_installment(&NewInstallment {
            revenue_id,
            installment_number: index as i32 + 1,
            due_date: input.due_date,
            amount_due: input.amount_due,
        })
        .await?;
    }
    Ok(())
}

impl RevenueService {
    pub fn new(
        store: Arc<dyn RevenueStore>,
        storage: Arc<dyn AttachmentStorage>,
        window_months: u32,
    ) -> Self {
        Self {
            store,
            storage,
            window_months,
        }
    }

    pub fn store(&self) -> &Arc<dyn RevenueStore> {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Create / update
    // -------------------------------------------------------------------------

    #[instrument(skip(self, request), fields(category_id = ?request.category_id, bus_trip_id = ?request.bus_trip_id))]
    pub async fn create_revenue(
        &self,
        request: CreateRevenueRequest,
    ) -> Result<RevenueResponse, AppError> {
        let today = today();
        let remarks = validate_remarks(&request.remarks)?;
        let uploads = decode_attachments(&request.attachments)?;

        let mut tx = self.store.begin().await?;

        let assignment = match (&request.bus_trip_id, &request.assignment_id) {
            (_, Some(assignment_id)) => Some(find_assignment(tx.as_mut(), assignment_id).await?),
            (Some(bus_trip_id), None) => Some(
                tx.find_assignment_by_bus_trip(bus_trip_id)
                    .await?
                    .ok_or_else(|| not_found("Bus trip", bus_trip_id))?,
            ),
            (None, None) => None,
        };

        let category = match (request.category_id, &assignment) {
            (Some(category_id), _) => find_category(tx.as_mut(), category_id).await?,
            (None, Some(assignment)) => tx
                .find_category_by_name(&assignment.assignment_type)
                .await?
                .ok_or_else(|| not_found("Category", &assignment.assignment_type))?,
            (None, None) => return Err(RuleViolation::MissingField("category_id").into()),
        };
        let kind = category.kind();

        let status = ledger::resolve_payment_status(tx.as_mut(), request.payment_status_id).await?;
        if let Some(method_id) = request.payment_method_id {
            ledger::resolve_payment_method(tx.as_mut(), method_id).await?;
        }

        let amounts: Vec<Decimal> = request.installments.iter().map(|i| i.amount_due).collect();
        let collected = match (request.total_amount, &assignment) {
            (Some(amount), _) => amount,
            (None, Some(assignment)) => default_collected_amount(kind, assignment),
            (None, None) if request.is_receivable && !amounts.is_empty() => Decimal::ZERO,
            (None, None) => return Err(RuleViolation::MissingField("total_amount").into()),
        };
        if collected < Decimal::ZERO {
            return Err(RuleViolation::NegativeAmount("total_amount").into());
        }

        validate_payment_method_required(
            collected,
            request.is_receivable,
            &status.name,
            request.payment_method_id,
        )?;
        validate_collection_date_for_add(request.collection_date, today, self.window_months)?;

        let terms = if request.is_receivable {
            Some(validate_receivable_fields(
                request.collection_date,
                request.due_date,
                request.payer_name.as_deref(),
                request.interest_rate,
            )?)
        } else {
            None
        };

        let collected = if amounts.is_empty() {
            collected
        } else {
            if !request.is_receivable {
                return Err(RuleViolation::NotReceivable.into());
            }
            validate_installment_amounts(collected, &amounts)?
        };

        if let Some(assignment) = &assignment {
            validate_amount_against_trip(kind, collected, assignment.trip_revenue)?;
        }

        let settled = status.is_paid() || status.is_overpaid();
        let booked = booked_amounts(
            kind,
            assignment.as_ref(),
            collected,
            request.is_receivable,
            settled,
            Decimal::ZERO,
        );

        ensure_unique(
            tx.as_mut(),
            assignment.as_ref().map(|a| a.assignment_id.as_str()),
            category.category_id,
            booked.total_amount,
            request.collection_date,
            None,
        )
        .await?;

        let record = tx
            .insert_revenue(&NewRevenue {
                assignment_id: assignment.as_ref().map(|a| a.assignment_id.clone()),
                bus_trip_id: assignment.as_ref().map(|a| a.bus_trip_id.clone()),
                category_id: category.category_id,
                total_amount: booked.total_amount,
                remitted_amount: booked.remitted_amount,
                collection_date: request.collection_date,
                payment_method_id: request.payment_method_id,
                payment_status_id: status.payment_status_id,
                is_receivable: request.is_receivable,
                due_date: terms.as_ref().map(|t| t.due_date),
                payer_name: terms.as_ref().map(|t| t.payer_name.clone()),
                interest_rate: terms
                    .as_ref()
                    .map(|t| t.interest_rate)
                    .unwrap_or(Decimal::ZERO),
                outstanding_balance: ledger::outstanding_after(
                    booked.total_amount,
                    booked.remitted_amount,
                ),
                remarks,
            })
            .await?;
        insert_installments(tx.as_mut(), record.revenue_id, &request.installments).await?;
        let record = ledger::recalculate_revenue(tx.as_mut(), &record).await?;
        tx.commit().await?;

        info!(
            revenue_id = %record.revenue_id,
            revenue_code = %record.revenue_code,
            total_amount = %record.total_amount,
            outstanding = %record.outstanding_balance,
            "Revenue record created"
        );

        if !uploads.is_empty() {
            self.store_attachments(record.revenue_id, uploads).await?;
        }

        record_revenue_operation("create", "success");
        self.audit("create", &record);

        let mut warnings = Vec::new();
        if kind == CategoryKind::Boundary && record.assignment_id.is_some() {
            self.run_loan_hook(record.revenue_id, LoanHook::Upsert, &mut warnings)
                .await;
        }

        Ok(RevenueResponse {
            revenue: self.get_revenue(record.revenue_id).await?,
            warnings,
        })
    }

    #[instrument(skip(self, request), fields(revenue_id = %revenue_id))]
    pub async fn update_revenue(
        &self,
        revenue_id: Uuid,
        request: UpdateRevenueRequest,
    ) -> Result<RevenueResponse, AppError> {
        let today = today();
        let mut tx = self.store.begin().await?;
        let existing = tx
            .lock_revenue(revenue_id)
            .await?
            .ok_or_else(|| not_found("Revenue record", revenue_id))?;

        let existing_kind = find_category(tx.as_mut(), existing.category_id).await?.kind();
        let category = match request.category_id {
            Some(category_id) => find_category(tx.as_mut(), category_id).await?,
            None => find_category(tx.as_mut(), existing.category_id).await?,
        };
        let kind = category.kind();

        let assignment_id = request
            .assignment_id
            .clone()
            .or_else(|| existing.assignment_id.clone());
        let assignment = match &assignment_id {
            Some(id) => Some(find_assignment(tx.as_mut(), id).await?),
            None => None,
        };

        let status_id = request
            .payment_status_id
            .unwrap_or(existing.payment_status_id);
        let status = ledger::resolve_payment_status(tx.as_mut(), status_id).await?;
        if let Some(method_id) = request.payment_method_id {
            ledger::resolve_payment_method(tx.as_mut(), method_id).await?;
        }
        let payment_method_id = request.payment_method_id.or(existing.payment_method_id);

        let collection_date = match request.collection_date {
            Some(date) => {
                validate_collection_date_for_edit(
                    date,
                    existing.created_utc,
                    today,
                    self.window_months,
                )?;
                date
            }
            None => existing.collection_date,
        };
        let remarks = match &request.remarks {
            Some(remarks) => validate_remarks(remarks)?,
            None => existing.remarks.clone(),
        };

        let is_receivable = request.is_receivable.unwrap_or(existing.is_receivable);
        let terms = if is_receivable {
            Some(validate_receivable_fields(
                collection_date,
                request.due_date.or(existing.due_date),
                request
                    .payer_name
                    .as_deref()
                    .or(existing.payer_name.as_deref()),
                request.interest_rate.or(Some(existing.interest_rate)),
            )?)
        } else {
            None
        };

        let collected = request
            .total_amount
            .unwrap_or_else(|| collected_amount(&existing, existing_kind));
        if collected < Decimal::ZERO {
            return Err(RuleViolation::NegativeAmount("total_amount").into());
        }

        let installments = tx.list_installments(revenue_id).await?;
        let collected = if !installments.is_empty() && !collected.is_zero() {
            let amounts: Vec<Decimal> = installments.iter().map(|i| i.amount_due).collect();
            validate_installment_amounts(collected, &amounts)?
        } else {
            collected
        };

        validate_payment_method_required(collected, is_receivable, &status.name, payment_method_id)?;
        if let Some(assignment) = &assignment {
            validate_amount_against_trip(kind, collected, assignment.trip_revenue)?;
        }

        let paid_by_payments = tx.sum_revenue_payments(revenue_id).await?;
        let booked = booked_amounts(
            kind,
            assignment.as_ref(),
            collected,
            is_receivable,
            status.is_paid() || status.is_overpaid(),
            paid_by_payments,
        );

        ensure_unique(
            tx.as_mut(),
            assignment_id.as_deref(),
            category.category_id,
            booked.total_amount,
            collection_date,
            Some(revenue_id),
        )
        .await?;

        let mut record = existing.clone();
        record.category_id = category.category_id;
        record.assignment_id = assignment.as_ref().map(|a| a.assignment_id.clone());
        record.bus_trip_id = assignment
            .as_ref()
            .map(|a| a.bus_trip_id.clone())
            .or(existing.bus_trip_id.clone());
        record.total_amount = booked.total_amount;
        record.remitted_amount = booked.remitted_amount;
        record.collection_date = collection_date;
        record.payment_method_id = payment_method_id;
        record.payment_status_id = status.payment_status_id;
        record.is_receivable = is_receivable;
        record.due_date = terms.as_ref().map(|t| t.due_date);
        record.payer_name = terms.as_ref().map(|t| t.payer_name.clone());
        record.interest_rate = terms
            .as_ref()
            .map(|t| t.interest_rate)
            .unwrap_or(Decimal::ZERO);
        record.remarks = remarks;

        let record = tx.update_revenue(&record).await?;
        let record = ledger::recalculate_revenue(tx.as_mut(), &record).await?;
        tx.commit().await?;

        info!(
            revenue_id = %record.revenue_id,
            total_amount = %record.total_amount,
            outstanding = %record.outstanding_balance,
            "Revenue record updated"
        );
        record_revenue_operation("update", "success");
        self.audit("update", &record);

        let mut warnings = Vec::new();
        let hook = if kind == CategoryKind::Boundary && record.assignment_id.is_some() {
            LoanHook::Upsert
        } else {
            LoanHook::Clamp
        };
        self.run_loan_hook(revenue_id, hook, &mut warnings).await;

        Ok(RevenueResponse {
            revenue: self.get_revenue(revenue_id).await?,
            warnings,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_revenue(&self, revenue_id: Uuid) -> Result<(), AppError> {
        let mut tx = self.store.begin().await?;
        if !tx.soft_delete_revenue(revenue_id).await? {
            return Err(not_found("Revenue record", revenue_id));
        }
        tx.commit().await?;
        info!(revenue_id = %revenue_id, "Revenue record soft-deleted");
        record_revenue_operation("delete", "success");
        Ok(())
    }

    /// Attach an installment plan to a receivable that has none yet. A
    /// receivable shell booked at zero takes its total from the plan.
    #[instrument(skip(self, request), fields(revenue_id = %revenue_id, count = request.installments.len()))]
    pub async fn add_installments(
        &self,
        revenue_id: Uuid,
        request: AddInstallmentsRequest,
    ) -> Result<RevenueResponse, AppError> {
        let mut tx = self.store.begin().await?;
        let mut record = tx
            .lock_revenue(revenue_id)
            .await?
            .ok_or_else(|| not_found("Revenue record", revenue_id))?;
        if !record.is_receivable {
            return Err(RuleViolation::NotReceivable.into());
        }
        if !tx.list_installments(revenue_id).await?.is_empty() {
            return Err(RuleViolation::InstallmentsAlreadyExist.into());
        }

        let amounts: Vec<Decimal> = request.installments.iter().map(|i| i.amount_due).collect();
        let total = validate_installment_amounts(record.total_amount, &amounts)?;
        if total != record.total_amount {
            record.total_amount = total;
            record = tx.update_revenue(&record).await?;
        }
        insert_installments(tx.as_mut(), revenue_id, &request.installments).await?;
        let record = ledger::recalculate_revenue(tx.as_mut(), &record).await?;
        tx.commit().await?;

        info!(
            revenue_id = %revenue_id,
            total_amount = %record.total_amount,
            "Installments added"
        );

        Ok(RevenueResponse {
            revenue: self.get_revenue(revenue_id).await?,
            warnings: Vec::new(),
        })
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    pub async fn record_installment_payment(
        &self,
        installment_id: Uuid,
        request: RecordInstallmentPaymentRequest,
    ) -> Result<InstallmentPaymentResponse, AppError> {
        let line = payment_line(
            Some(installment_id),
            request.pay_amount,
            "pay_amount",
            request.payment_method_id,
            request.payment_status_id,
            request.paid_date,
            request.reference_number,
            request.remarks,
        )?;

        let mut tx = self.store.begin().await?;
        let outcome = ledger::record_installment_payment(tx.as_mut(), installment_id, line).await?;
        tx.commit().await?;
        record_payment("installment");

        let mut warnings = Vec::new();
        self.run_loan_hook(outcome.revenue.revenue_id, LoanHook::Clamp, &mut warnings)
            .await;

        Ok(InstallmentPaymentResponse {
            installment: InstallmentView::new(outcome.installment, today()),
            payment: outcome.payment,
            outstanding_balance: outcome.revenue.outstanding_balance,
            payment_status_id: outcome.revenue.payment_status_id,
            warnings,
        })
    }

    pub async fn record_payments(
        &self,
        revenue_id: Uuid,
        request: BatchPaymentRequest,
    ) -> Result<BatchPaymentResponse, AppError> {
        let lines = request
            .payments
            .into_iter()
            .map(|line| {
                payment_line(
                    line.installment_id,
                    line.amount,
                    "amount",
                    line.payment_method_id,
                    line.payment_status_id,
                    line.paid_date,
                    line.reference_number,
                    line.remarks,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.store.begin().await?;
        let (payments, revenue) = ledger::record_payment_batch(tx.as_mut(), revenue_id, lines).await?;
        tx.commit().await?;
        for _ in &payments {
            record_payment("revenue");
        }

        let mut warnings = Vec::new();
        self.run_loan_hook(revenue_id, LoanHook::Clamp, &mut warnings)
            .await;

        Ok(BatchPaymentResponse {
            payments,
            outstanding_balance: revenue.outstanding_balance,
            payment_status_id: revenue.payment_status_id,
            warnings,
        })
    }

    // -------------------------------------------------------------------------
    // Loans
    // -------------------------------------------------------------------------

    /// Generate or refresh the shortage loan on request. Unlike the post-commit
    /// hook, failures here are returned to the caller.
    #[instrument(skip(self, shares), fields(revenue_id = %revenue_id))]
    pub async fn refresh_loan(
        &self,
        revenue_id: Uuid,
        shares: Option<Vec<ShareRequest>>,
    ) -> Result<Option<LoanDetail>, AppError> {
        let mut tx = self.store.begin().await?;
        let loan = loan::upsert_boundary_loan_for_revenue(tx.as_mut(), revenue_id, shares).await;
        let loan = match loan {
            Ok(loan) => loan,
            Err(e) => {
                record_loan_upsert("manual", "error");
                return Err(e);
            }
        };
        tx.commit().await?;
        record_loan_upsert("manual", "success");
        Ok(loan)
    }

    pub async fn get_loan(&self, revenue_id: Uuid) -> Result<LoanDetail, AppError> {
        let mut tx = self.store.begin().await?;
        tx.get_revenue(revenue_id)
            .await?
            .ok_or_else(|| not_found("Revenue record", revenue_id))?;
        tx.find_loan(revenue_id)
            .await?
            .ok_or_else(|| not_found("Loan for revenue record", revenue_id))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn get_revenue(&self, revenue_id: Uuid) -> Result<RevenueView, AppError> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .get_revenue(revenue_id)
            .await?
            .ok_or_else(|| not_found("Revenue record", revenue_id))?;
        self.build_view(tx.as_mut(), record).await
    }

    async fn build_view(
        &self,
        tx: &mut dyn StoreTx,
        record: RevenueRecord,
    ) -> Result<RevenueView, AppError> {
        let today = today();
        let category = find_category(tx, record.category_id).await?;
        let status = tx
            .find_payment_status(record.payment_status_id)
            .await?
            .ok_or_else(|| not_found("Payment status", record.payment_status_id))?;
        let method_name = match record.payment_method_id {
            Some(id) => tx.find_payment_method(id).await?.map(|m| m.name),
            None => None,
        };
        let boundary_loss = match (&record.assignment_id, category.kind()) {
            (Some(assignment_id), CategoryKind::Boundary) => tx
                .find_assignment(assignment_id)
                .await?
                .map(|a| get_boundary_loss_info(CategoryKind::Boundary, &a)),
            _ => None,
        };

        let total_paid = ledger::total_paid(tx, &record).await?;
        let installments = tx
            .list_installments(record.revenue_id)
            .await?
            .into_iter()
            .map(|i| InstallmentView::new(i, today))
            .collect();
        let payments = tx.list_payments(record.revenue_id).await?;
        let loan = tx.find_loan(record.revenue_id).await?;
        let attachments = tx.list_attachments(record.revenue_id).await?;

        Ok(RevenueView {
            category_kind: category.kind(),
            category_name: category.name,
            payment_status_name: status.name,
            payment_method_name: method_name,
            total_paid,
            boundary_loss,
            installments,
            payments,
            loan,
            attachments,
            record,
        })
    }

    pub async fn list_revenues(
        &self,
        params: ListRevenuesParams,
    ) -> Result<(Vec<RevenueRecord>, i64, ListRevenuesFilter), AppError> {
        let (date_from, date_to) = match params.period {
            Some(period) => {
                let (from, to) = period.range(params.reference_date.unwrap_or_else(today));
                (Some(from), Some(to))
            }
            None => (params.date_from, params.date_to),
        };
        let filter = ListRevenuesFilter {
            category_id: params.category_id,
            date_from,
            date_to,
            sort: params.sort.unwrap_or_default(),
            order: params.order.unwrap_or_default(),
            page: params.page.unwrap_or(1).max(1),
            limit: params
                .limit
                .unwrap_or(DEFAULT_PAGE_LIMIT)
                .clamp(1, MAX_PAGE_LIMIT),
        };

        let mut tx = self.store.begin().await?;
        let (rows, total) = tx.list_revenues(&filter).await?;
        Ok((rows, total, filter))
    }

    // -------------------------------------------------------------------------
    // Assignment cache
    // -------------------------------------------------------------------------

    #[instrument(skip(self, request), fields(assignment_id = %request.assignment_id))]
    pub async fn sync_assignment(
        &self,
        request: SyncAssignmentRequest,
    ) -> Result<Assignment, AppError> {
        let assignment = Assignment {
            assignment_id: request.assignment_id.trim().to_string(),
            bus_trip_id: request.bus_trip_id.trim().to_string(),
            assignment_type: request.assignment_type.trim().to_string(),
            assignment_value: parse_amount_lenient(&request.assignment_value),
            trip_revenue: parse_amount_lenient(&request.trip_revenue),
            date_assigned: request.date_assigned,
            driver_id: request.driver_id,
            driver_name: request.driver_name,
            conductor_id: request.conductor_id,
            conductor_name: request.conductor_name,
            synced_utc: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        let stored = tx.upsert_assignment(&assignment).await?;
        tx.commit().await?;

        info!(
            assignment_id = %stored.assignment_id,
            assignment_type = %stored.assignment_type,
            trip_revenue = %stored.trip_revenue,
            "Assignment synced"
        );
        Ok(stored)
    }

    // -------------------------------------------------------------------------
    // Post-commit effects
    // -------------------------------------------------------------------------

    async fn run_loan_hook(&self, revenue_id: Uuid, hook: LoanHook, warnings: &mut Vec<String>) {
        let result = async {
            let mut tx = self.store.begin().await?;
            match hook {
                LoanHook::Upsert => {
                    loan::upsert_boundary_loan_for_revenue(tx.as_mut(), revenue_id, None).await?;
                }
                LoanHook::Clamp => {
                    loan::clamp_loan_to_outstanding(tx.as_mut(), revenue_id).await?;
                }
            }
            tx.commit().await
        }
        .await;

        match result {
            Ok(()) => record_loan_upsert(hook.as_str(), "success"),
            Err(e) => {
                warn!(revenue_id = %revenue_id, hook = hook.as_str(), error = %e, "Loan maintenance failed");
                record_loan_upsert(hook.as_str(), "error");
                record_secondary_failure("loan");
                warnings.push(format!("Loan {} failed: {}", hook.as_str(), e));
            }
        }
    }

    fn audit(&self, action: &str, record: &RevenueRecord) {
        info!(
            target: "audit",
            action = action,
            revenue_id = %record.revenue_id,
            revenue_code = %record.revenue_code,
            total_amount = %record.total_amount,
            "Revenue audit event"
        );
    }

    /// Upload files and record them. On any failure the uploaded files, then
    /// the attachment rows, then the revenue record itself are removed.
    async fn store_attachments(
        &self,
        revenue_id: Uuid,
        uploads: Vec<DecodedAttachment>,
    ) -> Result<(), AppError> {
        let mut uploaded: Vec<String> = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let attachment_id = Uuid::new_v4();
            let storage_key = format!(
                "revenues/{}/{}-{}",
                revenue_id, attachment_id, upload.file_name
            );
            let size_bytes = upload.data.len() as i64;

            if let Err(e) = self.storage.upload(&storage_key, upload.data).await {
                error!(revenue_id = %revenue_id, error = %e, "Attachment upload failed");
                self.compensate_attachments(revenue_id, &uploaded).await;
                return Err(AppError::BadGateway(format!(
                    "Attachment upload failed, revenue record was not created: {}",
                    e
                )));
            }
            uploaded.push(storage_key.clone());

            let row = NewAttachment {
                attachment_id,
                revenue_id,
                file_name: upload.file_name,
                content_type: upload.content_type,
                storage_key,
                size_bytes,
            };
            let saved = async {
                let mut tx = self.store.begin().await?;
                tx.insert_attachment(&row).await?;
                tx.commit().await
            }
            .await;
            if let Err(e) = saved {
                error!(revenue_id = %revenue_id, error = %e, "Attachment record failed");
                self.compensate_attachments(revenue_id, &uploaded).await;
                return Err(e);
            }
        }
        info!(revenue_id = %revenue_id, count = uploaded.len(), "Attachments stored");
        Ok(())
    }

    async fn compensate_attachments(&self, revenue_id: Uuid, uploaded: &[String]) {
        for key in uploaded {
            if let Err(e) = self.storage.delete(key).await {
                warn!(storage_key = %key, error = %e, "Failed to delete uploaded attachment");
            }
        }

        let purged = async {
            let mut tx = self.store.begin().await?;
            for attachment in tx.list_attachments(revenue_id).await? {
                tx.delete_attachment(attachment.attachment_id).await?;
            }
            tx.purge_revenue(revenue_id).await?;
            tx.commit().await
        }
        .await;

        match purged {
            Ok(()) => {
                record_revenue_operation("create", "compensated");
                info!(revenue_id = %revenue_id, "Revenue record rolled back after attachment failure");
            }
            Err(e) => {
                record_secondary_failure("attachment_compensation");
                error!(revenue_id = %revenue_id, error = %e, "Attachment compensation failed");
            }
        }
    }
}
