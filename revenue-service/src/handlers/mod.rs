pub mod assignments;
pub mod health;
pub mod loans;
pub mod payments;
pub mod revenues;

pub use assignments::sync_assignment;
pub use health::{health_check, metrics_handler, readiness_check};
pub use loans::{get_loan, refresh_loan};
pub use payments::{record_installment_payment, record_payments};
pub use revenues::{
    add_installments, create_revenue, delete_revenue, get_revenue, list_revenues, update_revenue,
};
