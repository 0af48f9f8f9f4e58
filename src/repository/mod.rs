pub mod approval_repository;
pub mod database;
pub mod memory;
pub mod models;
pub mod store;

pub use approval_repository::{ApprovalRepository, SqliteApprovalStore};
pub use database::Database;
pub use memory::MemoryApprovalStore;
pub use models::{Approval, ApprovalUpdate, NewApproval, TokenType};
pub use store::ApprovalStore;
