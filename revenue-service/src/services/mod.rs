pub mod calculator;
pub mod database;
pub mod ledger;
pub mod loan;
pub mod memory;
pub mod metrics;
pub mod revenue;
pub mod storage;
pub mod store;
pub mod validation;

pub use database::Database;
pub use memory::MemoryStore;
pub use revenue::RevenueService;
pub use storage::{AttachmentStorage, LocalStorage, MemoryStorage};
pub use store::{RevenueStore, StoreTx};
