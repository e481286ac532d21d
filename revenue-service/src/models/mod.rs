//! Domain models for revenue-service.

mod attachment;
mod installment;
mod loan;
mod payment;
mod reference;
mod revenue;

pub use attachment::{Attachment, NewAttachment};
pub use installment::{InstallmentStatus, NewInstallment, RevenueInstallment};
pub use loan::{BoundaryLoan, EmployeeRole, LoanDetail, LoanInstallment, LoanShare, LoanShareDetail};
pub use payment::{NewPayment, RevenuePayment};
pub use reference::{
    Assignment, Category, CategoryKind, InstallmentFrequency, PaymentMethod, PaymentStatus,
    SystemConfig,
};
pub use revenue::{ListRevenuesFilter, NewRevenue, Period, RevenueRecord, SortField, SortOrder};
