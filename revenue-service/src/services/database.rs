//! PostgreSQL store for revenue-service.

use crate::models::{
    Assignment, Attachment, BoundaryLoan, Category, InstallmentStatus, ListRevenuesFilter,
    LoanDetail, LoanInstallment, LoanShare, LoanShareDetail, NewAttachment, NewInstallment,
    NewPayment, NewRevenue, PaymentMethod, PaymentStatus, RevenueInstallment, RevenuePayment,
    RevenueRecord, SystemConfig,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{RevenueStore, StoreTx};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const REVENUE_COLUMNS: &str = "revenue_id, revenue_code, assignment_id, bus_trip_id, category_id, \
     total_amount, remitted_amount, collection_date, payment_method_id, payment_status_id, \
     is_receivable, due_date, payer_name, interest_rate, outstanding_balance, remarks, \
     is_deleted, created_utc, updated_utc";

const INSTALLMENT_COLUMNS: &str = "installment_id, revenue_id, installment_number, due_date, \
     amount_due, amount_paid, status, created_utc, updated_utc";

const PAYMENT_COLUMNS: &str = "payment_id, revenue_id, installment_id, amount, payment_method_id, \
     payment_status_id, paid_date, reference_number, remarks, created_utc";

const ASSIGNMENT_COLUMNS: &str = "assignment_id, bus_trip_id, assignment_type, assignment_value, \
     trip_revenue, date_assigned, driver_id, driver_name, conductor_id, conductor_name, synced_utc";

const ATTACHMENT_COLUMNS: &str = "attachment_id, revenue_id, file_name, content_type, storage_key, \
     size_bytes, is_deleted, created_utc";

fn db_error(action: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "revenue-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RevenueStore for Database {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;
        Ok(Box::new(PgTx { tx }))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// One PostgreSQL transaction. Dropping it rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn fetch_revenue(
        &mut self,
        revenue_id: Uuid,
        for_update: bool,
    ) -> Result<Option<RevenueRecord>, AppError> {
        let sql = format!(
            "SELECT {} FROM revenues WHERE revenue_id = $1 AND NOT is_deleted{}",
            REVENUE_COLUMNS,
            if for_update { " FOR UPDATE" } else { "" }
        );
        sqlx::query_as::<_, RevenueRecord>(&sql)
            .bind(revenue_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("get revenue", e))
    }
}

#[async_trait]
impl StoreTx for PgTx {
    // -------------------------------------------------------------------------
    // Reference data
    // -------------------------------------------------------------------------

    async fn find_category(&mut self, category_id: Uuid) -> Result<Option<Category>, AppError> {
        sqlx::query_as::<_, Category>(
            "SELECT category_id, name, description FROM categories WHERE category_id = $1",
        )
        .bind(category_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("get category", e))
    }

    async fn find_category_by_name(&mut self, name: &str) -> Result<Option<Category>, AppError> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT category_id, name, description
            FROM categories
            WHERE LOWER(TRIM(REPLACE(name, '_', ' '))) = LOWER(TRIM(REPLACE($1, '_', ' ')))
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("get category by name", e))
    }

    async fn find_payment_method(
        &mut self,
        payment_method_id: Uuid,
    ) -> Result<Option<PaymentMethod>, AppError> {
        sqlx::query_as::<_, PaymentMethod>(
            "SELECT payment_method_id, name FROM payment_methods WHERE payment_method_id = $1",
        )
        .bind(payment_method_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("get payment method", e))
    }

    async fn find_payment_status(
        &mut self,
        payment_status_id: Uuid,
    ) -> Result<Option<PaymentStatus>, AppError> {
        sqlx::query_as::<_, PaymentStatus>(
            r#"
            SELECT payment_status_id, name, applies_to_revenue
            FROM payment_statuses
            WHERE payment_status_id = $1
            "#,
        )
        .bind(payment_status_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("get payment status", e))
    }

    async fn find_payment_status_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<PaymentStatus>, AppError> {
        sqlx::query_as::<_, PaymentStatus>(
            r#"
            SELECT payment_status_id, name, applies_to_revenue
            FROM payment_statuses
            WHERE applies_to_revenue AND LOWER(TRIM(name)) = LOWER(TRIM($1))
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("get payment status by name", e))
    }

    async fn find_assignment(
        &mut self,
        assignment_id: &str,
    ) -> Result<Option<Assignment>, AppError> {
        let sql = format!(
            "SELECT {} FROM assignments WHERE assignment_id = $1",
            ASSIGNMENT_COLUMNS
        );
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(assignment_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("get assignment", e))
    }

    async fn find_assignment_by_bus_trip(
        &mut self,
        bus_trip_id: &str,
    ) -> Result<Option<Assignment>, AppError> {
        let sql = format!(
            "SELECT {} FROM assignments WHERE bus_trip_id = $1 ORDER BY synced_utc DESC LIMIT 1",
            ASSIGNMENT_COLUMNS
        );
        sqlx::query_as::<_, Assignment>(&sql)
            .bind(bus_trip_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("get assignment by bus trip", e))
    }

    #[instrument(skip(self, assignment), fields(assignment_id = %assignment.assignment_id))]
    async fn upsert_assignment(&mut self, assignment: &Assignment) -> Result<Assignment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_assignment"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO assignments ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (assignment_id) DO UPDATE SET
                bus_trip_id = EXCLUDED.bus_trip_id,
                assignment_type = EXCLUDED.assignment_type,
                assignment_value = EXCLUDED.assignment_value,
                trip_revenue = EXCLUDED.trip_revenue,
                date_assigned = EXCLUDED.date_assigned,
                driver_id = EXCLUDED.driver_id,
                driver_name = EXCLUDED.driver_name,
                conductor_id = EXCLUDED.conductor_id,
                conductor_name = EXCLUDED.conductor_name,
                synced_utc = EXCLUDED.synced_utc
            RETURNING {cols}
            "#,
            cols = ASSIGNMENT_COLUMNS
        );
        let stored = sqlx::query_as::<_, Assignment>(&sql)
            .bind(&assignment.assignment_id)
            .bind(&assignment.bus_trip_id)
            .bind(&assignment.assignment_type)
            .bind(assignment.assignment_value)
            .bind(assignment.trip_revenue)
            .bind(assignment.date_assigned)
            .bind(&assignment.driver_id)
            .bind(&assignment.driver_name)
            .bind(&assignment.conductor_id)
            .bind(&assignment.conductor_name)
            .bind(assignment.synced_utc)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| db_error("upsert assignment", e))?;

        timer.observe_duration();
        Ok(stored)
    }

    async fn load_system_config(&mut self) -> Result<SystemConfig, AppError> {
        let config = sqlx::query_as::<_, SystemConfig>(
            r#"
            SELECT driver_share_pct, conductor_share_pct, default_installment_count, installment_frequency
            FROM system_config
            ORDER BY config_id
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("load system config", e))?;

        Ok(config.unwrap_or_default())
    }

    // -------------------------------------------------------------------------
    // Revenue records
    // -------------------------------------------------------------------------

    async fn lock_key(&mut self, key: &str) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("acquire advisory lock", e))?;
        Ok(())
    }

    async fn find_assignment_duplicate(
        &mut self,
        assignment_id: &str,
        collection_date: NaiveDate,
        category_id: Uuid,
        exclude_revenue_id: Option<Uuid>,
    ) -> Result<Option<RevenueRecord>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM revenues
            WHERE assignment_id = $1 AND collection_date = $2 AND category_id = $3
              AND NOT is_deleted
              AND ($4::uuid IS NULL OR revenue_id <> $4)
            LIMIT 1
            "#,
            REVENUE_COLUMNS
        );
        sqlx::query_as::<_, RevenueRecord>(&sql)
            .bind(assignment_id)
            .bind(collection_date)
            .bind(category_id)
            .bind(exclude_revenue_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("check assignment duplicate", e))
    }

    async fn find_manual_duplicate(
        &mut self,
        category_id: Uuid,
        total_amount: Decimal,
        collection_date: NaiveDate,
        exclude_revenue_id: Option<Uuid>,
    ) -> Result<Option<RevenueRecord>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM revenues
            WHERE assignment_id IS NULL AND category_id = $1 AND total_amount = $2
              AND collection_date = $3 AND NOT is_deleted
              AND ($4::uuid IS NULL OR revenue_id <> $4)
            LIMIT 1
            "#,
            REVENUE_COLUMNS
        );
        sqlx::query_as::<_, RevenueRecord>(&sql)
            .bind(category_id)
            .bind(total_amount)
            .bind(collection_date)
            .bind(exclude_revenue_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("check manual duplicate", e))
    }

    #[instrument(skip(self, input), fields(category_id = %input.category_id))]
    async fn insert_revenue(&mut self, input: &NewRevenue) -> Result<RevenueRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_revenue"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO revenues (
                revenue_id, revenue_code, assignment_id, bus_trip_id, category_id,
                total_amount, remitted_amount, collection_date, payment_method_id,
                payment_status_id, is_receivable, due_date, payer_name, interest_rate,
                outstanding_balance, remarks
            )
            VALUES ($1, next_revenue_code(), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING {}
            "#,
            REVENUE_COLUMNS
        );
        let record = sqlx::query_as::<_, RevenueRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&input.assignment_id)
            .bind(&input.bus_trip_id)
            .bind(input.category_id)
            .bind(input.total_amount)
            .bind(input.remitted_amount)
            .bind(input.collection_date)
            .bind(input.payment_method_id)
            .bind(input.payment_status_id)
            .bind(input.is_receivable)
            .bind(input.due_date)
            .bind(&input.payer_name)
            .bind(input.interest_rate)
            .bind(input.outstanding_balance)
            .bind(&input.remarks)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "A revenue record already exists for this assignment, date and category"
                    ))
                }
                _ => db_error("insert revenue", e),
            })?;

        timer.observe_duration();

        info!(
            revenue_id = %record.revenue_id,
            revenue_code = %record.revenue_code,
            "Revenue record inserted"
        );

        Ok(record)
    }

    async fn get_revenue(&mut self, revenue_id: Uuid) -> Result<Option<RevenueRecord>, AppError> {
        self.fetch_revenue(revenue_id, false).await
    }

    async fn lock_revenue(&mut self, revenue_id: Uuid) -> Result<Option<RevenueRecord>, AppError> {
        self.fetch_revenue(revenue_id, true).await
    }

    #[instrument(skip(self, record), fields(revenue_id = %record.revenue_id))]
    async fn update_revenue(&mut self, record: &RevenueRecord) -> Result<RevenueRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_revenue"])
            .start_timer();

        let sql = format!(
            r#"
            UPDATE revenues SET
                assignment_id = $2, bus_trip_id = $3, category_id = $4, total_amount = $5,
                remitted_amount = $6, collection_date = $7, payment_method_id = $8,
                payment_status_id = $9, is_receivable = $10, due_date = $11, payer_name = $12,
                interest_rate = $13, outstanding_balance = $14, remarks = $15,
                updated_utc = NOW()
            WHERE revenue_id = $1 AND NOT is_deleted
            RETURNING {}
            "#,
            REVENUE_COLUMNS
        );
        let updated = sqlx::query_as::<_, RevenueRecord>(&sql)
            .bind(record.revenue_id)
            .bind(&record.assignment_id)
            .bind(&record.bus_trip_id)
            .bind(record.category_id)
            .bind(record.total_amount)
            .bind(record.remitted_amount)
            .bind(record.collection_date)
            .bind(record.payment_method_id)
            .bind(record.payment_status_id)
            .bind(record.is_receivable)
            .bind(record.due_date)
            .bind(&record.payer_name)
            .bind(record.interest_rate)
            .bind(record.outstanding_balance)
            .bind(&record.remarks)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "A revenue record already exists for this assignment, date and category"
                    ))
                }
                _ => db_error("update revenue", e),
            })?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Revenue record not found")))?;

        timer.observe_duration();
        Ok(updated)
    }

    async fn soft_delete_revenue(&mut self, revenue_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE revenues SET is_deleted = TRUE, updated_utc = NOW() WHERE revenue_id = $1 AND NOT is_deleted",
        )
        .bind(revenue_id)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| db_error("delete revenue", e))?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE revenue_attachments SET is_deleted = TRUE WHERE revenue_id = $1")
            .bind(revenue_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("delete attachments", e))?;

        Ok(true)
    }

    async fn purge_revenue(&mut self, revenue_id: Uuid) -> Result<(), AppError> {
        // Children cascade from revenues.
        sqlx::query("DELETE FROM revenues WHERE revenue_id = $1")
            .bind(revenue_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("purge revenue", e))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_revenues(
        &mut self,
        filter: &ListRevenuesFilter,
    ) -> Result<(Vec<RevenueRecord>, i64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_revenues"])
            .start_timer();

        let predicate = r#"
            NOT is_deleted
              AND ($1::uuid IS NULL OR category_id = $1)
              AND ($2::date IS NULL OR collection_date >= $2)
              AND ($3::date IS NULL OR collection_date <= $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM revenues WHERE {}",
            predicate
        ))
        .bind(filter.category_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| db_error("count revenues", e))?;

        let order = filter.order.as_sql();
        let sql = format!(
            "SELECT {} FROM revenues WHERE {} ORDER BY {} {}, revenue_code {} LIMIT $4 OFFSET $5",
            REVENUE_COLUMNS,
            predicate,
            filter.sort.column(),
            order,
            order
        );
        let rows = sqlx::query_as::<_, RevenueRecord>(&sql)
            .bind(filter.category_id)
            .bind(filter.date_from)
            .bind(filter.date_to)
            .bind(filter.limit as i64)
            .bind(filter.offset())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| db_error("list revenues", e))?;

        timer.observe_duration();
        Ok((rows, total))
    }

    // -------------------------------------------------------------------------
    // Installments
    // -------------------------------------------------------------------------

    async fn insert_installment(
        &mut self,
        input: &NewInstallment,
    ) -> Result<RevenueInstallment, AppError> {
        let sql = format!(
            r#"
            INSERT INTO revenue_installments (installment_id, revenue_id, installment_number, due_date, amount_due, amount_paid, status)
            VALUES ($1, $2, $3, $4, $5, 0, $6)
            RETURNING {}
            "#,
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, RevenueInstallment>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.revenue_id)
            .bind(input.installment_number)
            .bind(input.due_date)
            .bind(input.amount_due)
            .bind(InstallmentStatus::Pending.as_str())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    AppError::Conflict(anyhow::anyhow!(
                        "Installment number {} already exists",
                        input.installment_number
                    ))
                }
                _ => db_error("insert installment", e),
            })
    }

    async fn list_installments(
        &mut self,
        revenue_id: Uuid,
    ) -> Result<Vec<RevenueInstallment>, AppError> {
        let sql = format!(
            "SELECT {} FROM revenue_installments WHERE revenue_id = $1 ORDER BY installment_number",
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, RevenueInstallment>(&sql)
            .bind(revenue_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| db_error("list installments", e))
    }

    async fn find_installment(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Option<RevenueInstallment>, AppError> {
        let sql = format!(
            "SELECT {} FROM revenue_installments WHERE installment_id = $1",
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, RevenueInstallment>(&sql)
            .bind(installment_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("get installment", e))
    }

    async fn lock_installment(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Option<RevenueInstallment>, AppError> {
        let sql = format!(
            "SELECT {} FROM revenue_installments WHERE installment_id = $1 FOR UPDATE",
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, RevenueInstallment>(&sql)
            .bind(installment_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("lock installment", e))
    }

    async fn update_installment_progress(
        &mut self,
        installment_id: Uuid,
        amount_paid: Decimal,
        status: InstallmentStatus,
    ) -> Result<RevenueInstallment, AppError> {
        let sql = format!(
            r#"
            UPDATE revenue_installments
            SET amount_paid = $2, status = $3, updated_utc = NOW()
            WHERE installment_id = $1
            RETURNING {}
            "#,
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, RevenueInstallment>(&sql)
            .bind(installment_id)
            .bind(amount_paid)
            .bind(status.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| db_error("update installment", e))?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Installment not found")))
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(revenue_id = %input.revenue_id, amount = %input.amount))]
    async fn insert_payment(&mut self, input: &NewPayment) -> Result<RevenuePayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        let sql = format!(
            r#"
            INSERT INTO revenue_payments (payment_id, revenue_id, installment_id, amount, payment_method_id, payment_status_id, paid_date, reference_number, remarks)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        );
        let payment = sqlx::query_as::<_, RevenuePayment>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.revenue_id)
            .bind(input.installment_id)
            .bind(input.amount)
            .bind(input.payment_method_id)
            .bind(input.payment_status_id)
            .bind(input.paid_date)
            .bind(&input.reference_number)
            .bind(&input.remarks)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| db_error("insert payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    async fn list_payments(&mut self, revenue_id: Uuid) -> Result<Vec<RevenuePayment>, AppError> {
        let sql = format!(
            "SELECT {} FROM revenue_payments WHERE revenue_id = $1 ORDER BY paid_date, created_utc",
            PAYMENT_COLUMNS
        );
        sqlx::query_as::<_, RevenuePayment>(&sql)
            .bind(revenue_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| db_error("list payments", e))
    }

    async fn sum_installment_payments(
        &mut self,
        installment_id: Uuid,
    ) -> Result<Decimal, AppError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM revenue_payments WHERE installment_id = $1",
        )
        .bind(installment_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| db_error("sum installment payments", e))
    }

    async fn sum_revenue_payments(&mut self, revenue_id: Uuid) -> Result<Decimal, AppError> {
        sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(amount), 0) FROM revenue_payments WHERE revenue_id = $1",
        )
        .bind(revenue_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| db_error("sum revenue payments", e))
    }

    // -------------------------------------------------------------------------
    // Loans
    // -------------------------------------------------------------------------

    async fn find_loan(&mut self, revenue_id: Uuid) -> Result<Option<LoanDetail>, AppError> {
        let loan = sqlx::query_as::<_, BoundaryLoan>(
            r#"
            SELECT loan_id, revenue_id, assignment_id, assignment_value, trip_revenue,
                   total_amount, shortage, principal, created_utc, updated_utc
            FROM boundary_loans
            WHERE revenue_id = $1
            "#,
        )
        .bind(revenue_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| db_error("get loan", e))?;

        let Some(loan) = loan else {
            return Ok(None);
        };

        let shares = sqlx::query_as::<_, LoanShare>(
            r#"
            SELECT share_id, loan_id, employee_id, employee_name, role, share_amount
            FROM loan_shares
            WHERE loan_id = $1
            ORDER BY position
            "#,
        )
        .bind(loan.loan_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("list loan shares", e))?;

        let installments = sqlx::query_as::<_, LoanInstallment>(
            r#"
            SELECT loan_installment_id, share_id, loan_id, installment_number, due_date, amount_due
            FROM loan_installments
            WHERE loan_id = $1
            ORDER BY installment_number
            "#,
        )
        .bind(loan.loan_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| db_error("list loan installments", e))?;

        let shares = shares
            .into_iter()
            .map(|share| {
                let installments = installments
                    .iter()
                    .filter(|i| i.share_id == share.share_id)
                    .cloned()
                    .collect();
                LoanShareDetail {
                    share,
                    installments,
                }
            })
            .collect();

        Ok(Some(LoanDetail { loan, shares }))
    }

    #[instrument(skip(self, detail), fields(revenue_id = %detail.loan.revenue_id))]
    async fn save_loan(&mut self, detail: &LoanDetail) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_loan"])
            .start_timer();

        let loan = &detail.loan;
        let loan_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO boundary_loans (loan_id, revenue_id, assignment_id, assignment_value, trip_revenue, total_amount, shortage, principal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (revenue_id) DO UPDATE SET
                assignment_id = EXCLUDED.assignment_id,
                assignment_value = EXCLUDED.assignment_value,
                trip_revenue = EXCLUDED.trip_revenue,
                total_amount = EXCLUDED.total_amount,
                shortage = EXCLUDED.shortage,
                principal = EXCLUDED.principal,
                updated_utc = NOW()
            RETURNING loan_id
            "#,
        )
        .bind(loan.loan_id)
        .bind(loan.revenue_id)
        .bind(&loan.assignment_id)
        .bind(loan.assignment_value)
        .bind(loan.trip_revenue)
        .bind(loan.total_amount)
        .bind(loan.shortage)
        .bind(loan.principal)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| db_error("upsert loan", e))?;

        // Shares cascade to their schedules.
        sqlx::query("DELETE FROM loan_shares WHERE loan_id = $1")
            .bind(loan_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("replace loan shares", e))?;

        for (position, entry) in detail.shares.iter().enumerate() {
            let share = &entry.share;
            sqlx::query(
                r#"
                INSERT INTO loan_shares (share_id, loan_id, employee_id, employee_name, role, share_amount, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(share.share_id)
            .bind(loan_id)
            .bind(&share.employee_id)
            .bind(&share.employee_name)
            .bind(&share.role)
            .bind(share.share_amount)
            .bind(position as i32)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("insert loan share", e))?;

            for installment in &entry.installments {
                sqlx::query(
                    r#"
                    INSERT INTO loan_installments (loan_installment_id, share_id, loan_id, installment_number, due_date, amount_due)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(installment.loan_installment_id)
                .bind(share.share_id)
                .bind(loan_id)
                .bind(installment.installment_number)
                .bind(installment.due_date)
                .bind(installment.amount_due)
                .execute(&mut *self.tx)
                .await
                .map_err(|e| db_error("insert loan installment", e))?;
            }
        }

        timer.observe_duration();

        info!(loan_id = %loan_id, principal = %loan.principal, "Boundary loan saved");

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Attachments
    // -------------------------------------------------------------------------

    async fn insert_attachment(&mut self, input: &NewAttachment) -> Result<Attachment, AppError> {
        let sql = format!(
            r#"
            INSERT INTO revenue_attachments (attachment_id, revenue_id, file_name, content_type, storage_key, size_bytes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            ATTACHMENT_COLUMNS
        );
        sqlx::query_as::<_, Attachment>(&sql)
            .bind(input.attachment_id)
            .bind(input.revenue_id)
            .bind(&input.file_name)
            .bind(&input.content_type)
            .bind(&input.storage_key)
            .bind(input.size_bytes)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| db_error("insert attachment", e))
    }

    async fn delete_attachment(&mut self, attachment_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM revenue_attachments WHERE attachment_id = $1")
            .bind(attachment_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| db_error("delete attachment", e))?;
        Ok(())
    }

    async fn list_attachments(&mut self, revenue_id: Uuid) -> Result<Vec<Attachment>, AppError> {
        let sql = format!(
            "SELECT {} FROM revenue_attachments WHERE revenue_id = $1 AND NOT is_deleted ORDER BY created_utc",
            ATTACHMENT_COLUMNS
        );
        sqlx::query_as::<_, Attachment>(&sql)
            .bind(revenue_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| db_error("list attachments", e))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx
            .commit()
            .await
            .map_err(|e| db_error("commit transaction", e))
    }
}
