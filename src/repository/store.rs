use crate::chains::Chain;
use crate::error::StoreError;
use crate::repository::models::{Approval, ApprovalUpdate, NewApproval};
use alloy_primitives::Address;
use async_trait::async_trait;

/// CRUD over approval records plus the lookups used for dedup and fallback.
///
/// Implementations: [`MemoryApprovalStore`](super::MemoryApprovalStore) and
/// [`SqliteApprovalStore`](super::SqliteApprovalStore). Listings are ordered by id.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get(&self, id: i64) -> Result<Option<Approval>, StoreError>;

    /// All records, or only those owned by `user_id`.
    async fn list(&self, user_id: Option<i64>) -> Result<Vec<Approval>, StoreError>;

    async fn list_by_chain(&self, chain: Chain) -> Result<Vec<Approval>, StoreError>;

    async fn list_by_wallet(
        &self,
        wallet: Address,
        chain: Chain,
    ) -> Result<Vec<Approval>, StoreError>;

    /// Dedup lookup: the record for `contract` under this wallet and chain.
    async fn find_by_contract(
        &self,
        wallet: Address,
        chain: Chain,
        contract: Address,
    ) -> Result<Option<Approval>, StoreError>;

    /// Inserts a new, unrevoked record and assigns its id and timestamps.
    async fn create(&self, approval: NewApproval) -> Result<Approval, StoreError>;

    /// `None` when no record has this id.
    async fn update(&self, id: i64, update: ApprovalUpdate)
    -> Result<Option<Approval>, StoreError>;

    /// Marks the record revoked. Returns whether it exists.
    async fn revoke(&self, id: i64) -> Result<bool, StoreError>;

    /// Physically removes the record. Returns whether it existed.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;
}
