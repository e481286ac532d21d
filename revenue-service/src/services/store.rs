//! Persistence boundary for the revenue consistency unit.
//!
//! A revenue record, its installments, payments, loan and attachments are
//! read and written through one [`StoreTx`] so that derived balances and
//! statuses are never observed half-applied.

use crate::models::{
    Assignment, Attachment, Category, InstallmentStatus, ListRevenuesFilter, LoanDetail,
    NewAttachment, NewInstallment, NewPayment, NewRevenue, PaymentMethod, PaymentStatus,
    RevenueInstallment, RevenuePayment, RevenueRecord, SystemConfig,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait RevenueStore: Send + Sync {
    /// Open a unit of work. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait StoreTx: Send {
    // Reference data

    async fn find_category(&mut self, category_id: Uuid) -> Result<Option<Category>, AppError>;
    async fn find_category_by_name(&mut self, name: &str) -> Result<Option<Category>, AppError>;
    async fn find_payment_method(
        &mut self,
        payment_method_id: Uuid,
    ) -> Result<Option<PaymentMethod>, AppError>;
    async fn find_payment_status(
        &mut self,
        payment_status_id: Uuid,
    ) -> Result<Option<PaymentStatus>, AppError>;
    async fn find_payment_status_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<PaymentStatus>, AppError>;
    async fn find_assignment(&mut self, assignment_id: &str)
        -> Result<Option<Assignment>, AppError>;
    async fn find_assignment_by_bus_trip(
        &mut self,
        bus_trip_id: &str,
    ) -> Result<Option<Assignment>, AppError>;
    async fn upsert_assignment(&mut self, assignment: &Assignment) -> Result<Assignment, AppError>;
    async fn load_system_config(&mut self) -> Result<SystemConfig, AppError>;

    // Revenue records

    /// Serialise concurrent writers on an arbitrary business key until the
    /// unit of work ends.
    async fn lock_key(&mut self, key: &str) -> Result<(), AppError>;
    async fn find_assignment_duplicate(
        &mut self,
        assignment_id: &str,
        collection_date: NaiveDate,
        category_id: Uuid,
        exclude_revenue_id: Option<Uuid>,
    ) -> Result<Option<RevenueRecord>, AppError>;
    async fn find_manual_duplicate(
        &mut self,
        category_id: Uuid,
        total_amount: Decimal,
        collection_date: NaiveDate,
        exclude_revenue_id: Option<Uuid>,
    ) -> Result<Option<RevenueRecord>, AppError>;
    async fn insert_revenue(&mut self, input: &NewRevenue) -> Result<RevenueRecord, AppError>;
    /// Non-deleted record by id.
    async fn get_revenue(&mut self, revenue_id: Uuid) -> Result<Option<RevenueRecord>, AppError>;
    /// Non-deleted record by id, locked for the rest of the unit of work.
    async fn lock_revenue(&mut self, revenue_id: Uuid) -> Result<Option<RevenueRecord>, AppError>;
    async fn update_revenue(&mut self, record: &RevenueRecord) -> Result<RevenueRecord, AppError>;
    /// Soft delete the record and its attachments.
    async fn soft_delete_revenue(&mut self, revenue_id: Uuid) -> Result<bool, AppError>;
    /// Hard delete a record and everything hanging off it. Compensation only.
    async fn purge_revenue(&mut self, revenue_id: Uuid) -> Result<(), AppError>;
    async fn list_revenues(
        &mut self,
        filter: &ListRevenuesFilter,
    ) -> Result<(Vec<RevenueRecord>, i64), AppError>;

    // Installments

    async fn insert_installment(
        &mut self,
        input: &NewInstallment,
    ) -> Result<RevenueInstallment, AppError>;
    async fn list_installments(
        &mut self,
        revenue_id: Uuid,
    ) -> Result<Vec<RevenueInstallment>, AppError>;
    async fn find_installment(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Option<RevenueInstallment>, AppError>;
    /// Lock an installment. Callers lock the owning revenue first.
    async fn lock_installment(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Option<RevenueInstallment>, AppError>;
    async fn update_installment_progress(
        &mut self,
        installment_id: Uuid,
        amount_paid: Decimal,
        status: InstallmentStatus,
    ) -> Result<RevenueInstallment, AppError>;

    // Payments

    async fn insert_payment(&mut self, input: &NewPayment) -> Result<RevenuePayment, AppError>;
    async fn list_payments(&mut self, revenue_id: Uuid) -> Result<Vec<RevenuePayment>, AppError>;
    async fn sum_installment_payments(&mut self, installment_id: Uuid)
        -> Result<Decimal, AppError>;
    async fn sum_revenue_payments(&mut self, revenue_id: Uuid) -> Result<Decimal, AppError>;

    // Loans

    async fn find_loan(&mut self, revenue_id: Uuid) -> Result<Option<LoanDetail>, AppError>;
    /// Upsert the loan row keyed by revenue id and replace its shares and schedules.
    async fn save_loan(&mut self, loan: &LoanDetail) -> Result<(), AppError>;

    // Attachments

    async fn insert_attachment(&mut self, input: &NewAttachment) -> Result<Attachment, AppError>;
    async fn delete_attachment(&mut self, attachment_id: Uuid) -> Result<(), AppError>;
    async fn list_attachments(&mut self, revenue_id: Uuid) -> Result<Vec<Attachment>, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}
