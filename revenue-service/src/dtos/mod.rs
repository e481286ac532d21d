pub mod assignment;
pub mod loan;
pub mod payment;
pub mod revenue;

pub use assignment::SyncAssignmentRequest;
pub use loan::{LoanRequest, LoanResponse, ShareInput};
pub use payment::{
    BatchPaymentRequest, BatchPaymentResponse, InstallmentPaymentResponse, PaymentLineRequest,
    RecordInstallmentPaymentRequest,
};
pub use revenue::{
    AddInstallmentsRequest, AttachmentUpload, CreateRevenueRequest, InstallmentInput,
    InstallmentView, ListRevenuesParams, RevenueListResponse, RevenueResponse, RevenueView,
    UpdateRevenueRequest,
};
