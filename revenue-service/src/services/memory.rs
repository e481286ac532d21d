//! In-memory store used by tests and by local runs without `DATABASE_URL`.
//!
//! One async mutex guards the whole state. A unit of work holds the guard for
//! its lifetime and mutates a working copy that replaces the state on commit,
//! so units of work are fully serialised and a dropped one leaves no trace.

use crate::models::{
    Assignment, Attachment, Category, InstallmentStatus, ListRevenuesFilter, LoanDetail,
    NewAttachment, NewInstallment, NewPayment, NewRevenue, PaymentMethod, PaymentStatus,
    RevenueInstallment, RevenuePayment, RevenueRecord, SortField, SortOrder, SystemConfig,
};
use crate::services::store::{RevenueStore, StoreTx};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

fn normalize_name(name: &str) -> String {
    name.replace('_', " ").trim().to_string()
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    categories: Vec<Category>,
    payment_methods: Vec<PaymentMethod>,
    payment_statuses: Vec<PaymentStatus>,
    assignments: HashMap<String, Assignment>,
    system_config: Option<SystemConfig>,
    revenues: Vec<RevenueRecord>,
    installments: Vec<RevenueInstallment>,
    payments: Vec<RevenuePayment>,
    loans: HashMap<Uuid, LoanDetail>,
    attachments: Vec<Attachment>,
    revenue_sequence: u64,
    fail_loan_writes: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_category(&self, name: &str) -> Category {
        let category = Category {
            category_id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
        };
        self.state.lock().await.categories.push(category.clone());
        category
    }

    pub async fn add_payment_method(&self, name: &str) -> PaymentMethod {
        let method = PaymentMethod {
            payment_method_id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.state.lock().await.payment_methods.push(method.clone());
        method
    }

    pub async fn add_payment_status(&self, name: &str, applies_to_revenue: bool) -> PaymentStatus {
        let status = PaymentStatus {
            payment_status_id: Uuid::new_v4(),
            name: name.to_string(),
            applies_to_revenue,
        };
        self.state.lock().await.payment_statuses.push(status.clone());
        status
    }

    pub async fn add_assignment(&self, assignment: Assignment) {
        self.state
            .lock()
            .await
            .assignments
            .insert(assignment.assignment_id.clone(), assignment);
    }

    pub async fn set_system_config(&self, config: SystemConfig) {
        self.state.lock().await.system_config = Some(config);
    }

    /// Make every loan write fail, to exercise the best-effort hook path.
    pub async fn fail_loan_writes(&self, fail: bool) {
        self.state.lock().await.fail_loan_writes = fail;
    }

    /// Number of stored revenue records, soft-deleted ones included.
    pub async fn revenue_count(&self) -> usize {
        self.state.lock().await.revenues.len()
    }

    pub async fn attachment_count(&self) -> usize {
        self.state.lock().await.attachments.len()
    }
}

#[async_trait]
impl RevenueStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryTx {
    fn revenue_mut(&mut self, revenue_id: Uuid) -> Option<&mut RevenueRecord> {
        self.working
            .revenues
            .iter_mut()
            .find(|r| r.revenue_id == revenue_id)
    }

    fn live_revenue(&self, revenue_id: Uuid) -> Option<RevenueRecord> {
        self.working
            .revenues
            .iter()
            .find(|r| r.revenue_id == revenue_id && !r.is_deleted)
            .cloned()
    }
}

fn excluded(record: &RevenueRecord, exclude: Option<Uuid>) -> bool {
    exclude == Some(record.revenue_id)
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_category(&mut self, category_id: Uuid) -> Result<Option<Category>, AppError> {
        Ok(self
            .working
            .categories
            .iter()
            .find(|c| c.category_id == category_id)
            .cloned())
    }

    async fn find_category_by_name(&mut self, name: &str) -> Result<Option<Category>, AppError> {
        Ok(self
            .working
            .categories
            .iter()
            .find(|c| normalize_name(&c.name).eq_ignore_ascii_case(&normalize_name(name)))
            .cloned())
    }

    async fn find_payment_method(
        &mut self,
        payment_method_id: Uuid,
    ) -> Result<Option<PaymentMethod>, AppError> {
        Ok(self
            .working
            .payment_methods
            .iter()
            .find(|m| m.payment_method_id == payment_method_id)
            .cloned())
    }

    async fn find_payment_status(
        &mut self,
        payment_status_id: Uuid,
    ) -> Result<Option<PaymentStatus>, AppError> {
        Ok(self
            .working
            .payment_statuses
            .iter()
            .find(|s| s.payment_status_id == payment_status_id)
            .cloned())
    }

    async fn find_payment_status_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<PaymentStatus>, AppError> {
        Ok(self
            .working
            .payment_statuses
            .iter()
            .find(|s| s.applies_to_revenue && s.name.trim().eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    async fn find_assignment(
        &mut self,
        assignment_id: &str,
    ) -> Result<Option<Assignment>, AppError> {
        Ok(self.working.assignments.get(assignment_id).cloned())
    }

    async fn find_assignment_by_bus_trip(
        &mut self,
        bus_trip_id: &str,
    ) -> Result<Option<Assignment>, AppError> {
        Ok(self
            .working
            .assignments
            .values()
            .find(|a| a.bus_trip_id == bus_trip_id)
            .cloned())
    }

    async fn upsert_assignment(&mut self, assignment: &Assignment) -> Result<Assignment, AppError> {
        self.working
            .assignments
            .insert(assignment.assignment_id.clone(), assignment.clone());
        Ok(assignment.clone())
    }

    async fn load_system_config(&mut self) -> Result<SystemConfig, AppError> {
        Ok(self.working.system_config.clone().unwrap_or_default())
    }

    async fn lock_key(&mut self, _key: &str) -> Result<(), AppError> {
        // The unit of work already holds the global guard.
        Ok(())
    }

    async fn find_assignment_duplicate(
        &mut self,
        assignment_id: &str,
        collection_date: NaiveDate,
        category_id: Uuid,
        exclude_revenue_id: Option<Uuid>,
    ) -> Result<Option<RevenueRecord>, AppError> {
        Ok(self
            .working
            .revenues
            .iter()
            .find(|r| {
                !r.is_deleted
                    && !excluded(r, exclude_revenue_id)
                    && r.assignment_id.as_deref() == Some(assignment_id)
                    && r.collection_date == collection_date
                    && r.category_id == category_id
            })
            .cloned())
    }

    async fn find_manual_duplicate(
        &mut self,
        category_id: Uuid,
        total_amount: Decimal,
        collection_date: NaiveDate,
        exclude_revenue_id: Option<Uuid>,
    ) -> Result<Option<RevenueRecord>, AppError> {
        Ok(self
            .working
            .revenues
            .iter()
            .find(|r| {
                !r.is_deleted
                    && !excluded(r, exclude_revenue_id)
                    && r.assignment_id.is_none()
                    && r.category_id == category_id
                    && r.total_amount == total_amount
                    && r.collection_date == collection_date
            })
            .cloned())
    }

    async fn insert_revenue(&mut self, input: &NewRevenue) -> Result<RevenueRecord, AppError> {
        self.working.revenue_sequence += 1;
        let now = Utc::now();
        let record = RevenueRecord {
            revenue_id: Uuid::new_v4(),
            revenue_code: format!("REV-{:05}", self.working.revenue_sequence),
            assignment_id: input.assignment_id.clone(),
            bus_trip_id: input.bus_trip_id.clone(),
            category_id: input.category_id,
            total_amount: input.total_amount,
            remitted_amount: input.remitted_amount,
            collection_date: input.collection_date,
            payment_method_id: input.payment_method_id,
            payment_status_id: input.payment_status_id,
            is_receivable: input.is_receivable,
            due_date: input.due_date,
            payer_name: input.payer_name.clone(),
            interest_rate: input.interest_rate,
            outstanding_balance: input.outstanding_balance,
            remarks: input.remarks.clone(),
            is_deleted: false,
            created_utc: now,
            updated_utc: now,
        };
        self.working.revenues.push(record.clone());
        Ok(record)
    }

    async fn get_revenue(&mut self, revenue_id: Uuid) -> Result<Option<RevenueRecord>, AppError> {
        Ok(self.live_revenue(revenue_id))
    }

    async fn lock_revenue(&mut self, revenue_id: Uuid) -> Result<Option<RevenueRecord>, AppError> {
        Ok(self.live_revenue(revenue_id))
    }

    async fn update_revenue(&mut self, record: &RevenueRecord) -> Result<RevenueRecord, AppError> {
        let stored = self
            .revenue_mut(record.revenue_id)
            .filter(|r| !r.is_deleted)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Revenue record not found")))?;
        let mut updated = record.clone();
        updated.revenue_code = stored.revenue_code.clone();
        updated.created_utc = stored.created_utc;
        updated.is_deleted = false;
        updated.updated_utc = Utc::now();
        *stored = updated.clone();
        Ok(updated)
    }

    async fn soft_delete_revenue(&mut self, revenue_id: Uuid) -> Result<bool, AppError> {
        let Some(record) = self.revenue_mut(revenue_id).filter(|r| !r.is_deleted) else {
            return Ok(false);
        };
        record.is_deleted = true;
        record.updated_utc = Utc::now();
        for attachment in self
            .working
            .attachments
            .iter_mut()
            .filter(|a| a.revenue_id == revenue_id)
        {
            attachment.is_deleted = true;
        }
        Ok(true)
    }

    async fn purge_revenue(&mut self, revenue_id: Uuid) -> Result<(), AppError> {
        let state = &mut self.working;
        state.revenues.retain(|r| r.revenue_id != revenue_id);
        state.installments.retain(|i| i.revenue_id != revenue_id);
        state.payments.retain(|p| p.revenue_id != revenue_id);
        state.attachments.retain(|a| a.revenue_id != revenue_id);
        state.loans.remove(&revenue_id);
        Ok(())
    }

    async fn list_revenues(
        &mut self,
        filter: &ListRevenuesFilter,
    ) -> Result<(Vec<RevenueRecord>, i64), AppError> {
        let mut rows: Vec<RevenueRecord> = self
            .working
            .revenues
            .iter()
            .filter(|r| !r.is_deleted)
            .filter(|r| filter.category_id.map_or(true, |c| r.category_id == c))
            .filter(|r| filter.date_from.map_or(true, |d| r.collection_date >= d))
            .filter(|r| filter.date_to.map_or(true, |d| r.collection_date <= d))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match filter.sort {
                SortField::Code => a.revenue_code.cmp(&b.revenue_code),
                SortField::Date => a.collection_date.cmp(&b.collection_date),
                SortField::Amount => a.total_amount.cmp(&b.total_amount),
            }
            .then_with(|| a.revenue_code.cmp(&b.revenue_code));
            match filter.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_installment(
        &mut self,
        input: &NewInstallment,
    ) -> Result<RevenueInstallment, AppError> {
        let now = Utc::now();
        let installment = RevenueInstallment {
            installment_id: Uuid::new_v4(),
            revenue_id: input.revenue_id,
            installment_number: input.installment_number,
            due_date: input.due_date,
            amount_due: input.amount_due,
            amount_paid: Decimal::ZERO,
            status: InstallmentStatus::Pending,
            created_utc: now,
            updated_utc: now,
        };
        self.working.installments.push(installment.clone());
        Ok(installment)
    }

    async fn list_installments(
        &mut self,
        revenue_id: Uuid,
    ) -> Result<Vec<RevenueInstallment>, AppError> {
        let mut installments: Vec<RevenueInstallment> = self
            .working
            .installments
            .iter()
            .filter(|i| i.revenue_id == revenue_id)
            .cloned()
            .collect();
        installments.sort_by_key(|i| i.installment_number);
        Ok(installments)
    }

    async fn find_installment(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Option<RevenueInstallment>, AppError> {
        self.lock_installment(installment_id).await
    }

    async fn lock_installment(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Option<RevenueInstallment>, AppError> {
        Ok(self
            .working
            .installments
            .iter()
            .find(|i| i.installment_id == installment_id)
            .cloned())
    }

    async fn update_installment_progress(
        &mut self,
        installment_id: Uuid,
        amount_paid: Decimal,
        status: InstallmentStatus,
    ) -> Result<RevenueInstallment, AppError> {
        let installment = self
            .working
            .installments
            .iter_mut()
            .find(|i| i.installment_id == installment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Installment not found")))?;
        installment.amount_paid = amount_paid;
        installment.status = status;
        installment.updated_utc = Utc::now();
        Ok(installment.clone())
    }

    async fn insert_payment(&mut self, input: &NewPayment) -> Result<RevenuePayment, AppError> {
        let payment = RevenuePayment {
            payment_id: Uuid::new_v4(),
            revenue_id: input.revenue_id,
            installment_id: input.installment_id,
            amount: input.amount,
            payment_method_id: input.payment_method_id,
            payment_status_id: input.payment_status_id,
            paid_date: input.paid_date,
            reference_number: input.reference_number.clone(),
            remarks: input.remarks.clone(),
            created_utc: Utc::now(),
        };
        self.working.payments.push(payment.clone());
        Ok(payment)
    }

    async fn list_payments(&mut self, revenue_id: Uuid) -> Result<Vec<RevenuePayment>, AppError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.revenue_id == revenue_id)
            .cloned()
            .collect())
    }

    async fn sum_installment_payments(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Decimal, AppError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.installment_id == Some(installment_id))
            .map(|p| p.amount)
            .sum())
    }

    async fn sum_revenue_payments(&mut self, revenue_id: Uuid) -> Result<Decimal, AppError> {
        Ok(self
            .working
            .payments
            .iter()
            .filter(|p| p.revenue_id == revenue_id)
            .map(|p| p.amount)
            .sum())
    }

    async fn find_loan(&mut self, revenue_id: Uuid) -> Result<Option<LoanDetail>, AppError> {
        Ok(self.working.loans.get(&revenue_id).cloned())
    }

    async fn save_loan(&mut self, loan: &LoanDetail) -> Result<(), AppError> {
        if self.working.fail_loan_writes {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Loan table unavailable"
            )));
        }
        self.working.loans.insert(loan.loan.revenue_id, loan.clone());
        Ok(())
    }

    async fn insert_attachment(&mut self, input: &NewAttachment) -> Result<Attachment, AppError> {
        let attachment = Attachment {
            attachment_id: input.attachment_id,
            revenue_id: input.revenue_id,
            file_name: input.file_name.clone(),
            content_type: input.content_type.clone(),
            storage_key: input.storage_key.clone(),
            size_bytes: input.size_bytes,
            is_deleted: false,
            created_utc: Utc::now(),
        };
        self.working.attachments.push(attachment.clone());
        Ok(attachment)
    }

    async fn delete_attachment(&mut self, attachment_id: Uuid) -> Result<(), AppError> {
        self.working
            .attachments
            .retain(|a| a.attachment_id != attachment_id);
        Ok(())
    }

    async fn list_attachments(&mut self, revenue_id: Uuid) -> Result<Vec<Attachment>, AppError> {
        Ok(self
            .working
            .attachments
            .iter()
            .filter(|a| a.revenue_id == revenue_id && !a.is_deleted)
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
