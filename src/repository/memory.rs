//! In-memory approval store.
//!
//! Records live for the lifetime of the process. Useful for tests and for
//! running without a database file.

use crate::chains::Chain;
use crate::error::StoreError;
use crate::repository::models::{Approval, ApprovalUpdate, NewApproval, touch};
use crate::repository::store::ApprovalStore;
use alloy_primitives::Address;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

struct State {
    next_id: i64,
    records: BTreeMap<i64, Approval>,
}

pub struct MemoryApprovalStore {
    state: Mutex<State>,
}

impl Default for MemoryApprovalStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                records: BTreeMap::new(),
            }),
        }
    }
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Task("approval store lock poisoned".to_string()))
    }

    fn filtered(&self, keep: impl Fn(&Approval) -> bool) -> Result<Vec<Approval>, StoreError> {
        Ok(self
            .state()?
            .records
            .values()
            .filter(|a| keep(a))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn get(&self, id: i64) -> Result<Option<Approval>, StoreError> {
        Ok(self.state()?.records.get(&id).cloned())
    }

    async fn list(&self, user_id: Option<i64>) -> Result<Vec<Approval>, StoreError> {
        self.filtered(|a| user_id.is_none() || a.user_id == user_id)
    }

    async fn list_by_chain(&self, chain: Chain) -> Result<Vec<Approval>, StoreError> {
        self.filtered(|a| a.chain == chain)
    }

    async fn list_by_wallet(
        &self,
        wallet: Address,
        chain: Chain,
    ) -> Result<Vec<Approval>, StoreError> {
        self.filtered(|a| a.wallet_address == wallet && a.chain == chain)
    }

    async fn find_by_contract(
        &self,
        wallet: Address,
        chain: Chain,
        contract: Address,
    ) -> Result<Option<Approval>, StoreError> {
        Ok(self
            .state()?
            .records
            .values()
            .find(|a| {
                a.wallet_address == wallet && a.chain == chain && a.contract_address == contract
            })
            .cloned())
    }

    async fn create(&self, approval: NewApproval) -> Result<Approval, StoreError> {
        let mut state = self.state()?;
        let id = state.next_id;
        state.next_id += 1;

        let now = Utc::now();
        let record = Approval {
            id,
            user_id: approval.user_id,
            wallet_address: approval.wallet_address,
            contract_address: approval.contract_address,
            token_name: approval.token_name,
            token_symbol: approval.token_symbol,
            token_type: approval.token_type,
            spender_address: approval.spender_address,
            approved_amount: approval.approved_amount,
            chain: approval.chain,
            is_unlimited: approval.is_unlimited,
            is_revoked: false,
            created_at: now,
            updated_at: now,
        };
        state.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: i64,
        update: ApprovalUpdate,
    ) -> Result<Option<Approval>, StoreError> {
        let mut state = self.state()?;
        let Some(record) = state.records.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(record);
        record.updated_at = touch(record.created_at);
        Ok(Some(record.clone()))
    }

    async fn revoke(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        match state.records.get_mut(&id) {
            Some(record) => {
                record.is_revoked = true;
                record.updated_at = touch(record.created_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.state()?.records.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::models::TokenType;

    fn new_approval(contract: u8) -> NewApproval {
        NewApproval {
            user_id: None,
            wallet_address: Address::repeat_byte(0xa1),
            contract_address: Address::repeat_byte(contract),
            token_name: "Test".into(),
            token_symbol: "TST".into(),
            token_type: TokenType::Token,
            spender_address: Address::repeat_byte(0xb2),
            approved_amount: "Unlimited".into(),
            chain: Chain::Ethereum,
            is_unlimited: true,
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let store = MemoryApprovalStore::new();
        let first = store.create(new_approval(1)).await.unwrap();
        let second = store.create(new_approval(2)).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(!first.is_revoked);
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = MemoryApprovalStore::new();
        let record = store.create(new_approval(1)).await.unwrap();

        assert!(store.revoke(record.id).await.unwrap());
        assert!(store.revoke(record.id).await.unwrap());

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert!(stored.is_revoked);
        assert!(stored.updated_at >= stored.created_at);
        assert!(!store.revoke(999).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = MemoryApprovalStore::new();
        let record = store.create(new_approval(1)).await.unwrap();

        assert!(store.delete(record.id).await.unwrap());
        assert!(!store.delete(record.id).await.unwrap());
        assert!(store.get(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn finds_by_contract_within_wallet_and_chain() {
        let store = MemoryApprovalStore::new();
        store.create(new_approval(0xc3)).await.unwrap();

        let wallet = Address::repeat_byte(0xa1);
        let contract = Address::repeat_byte(0xc3);
        assert!(
            store
                .find_by_contract(wallet, Chain::Ethereum, contract)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_by_contract(wallet, Chain::Base, contract)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn update_refreshes_fields() {
        let store = MemoryApprovalStore::new();
        let record = store.create(new_approval(1)).await.unwrap();

        let updated = store
            .update(
                record.id,
                ApprovalUpdate {
                    approved_amount: Some("500".into()),
                    is_unlimited: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.approved_amount, "500");
        assert!(!updated.is_unlimited);
        assert_eq!(updated.spender_address, record.spender_address);
        assert!(store.update(42, ApprovalUpdate::default()).await.unwrap().is_none());
    }
}
