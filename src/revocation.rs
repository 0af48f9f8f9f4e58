use crate::error::StoreError;
use crate::repository::ApprovalStore;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a batch revocation. Counts are per requested id, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRevokeResult {
    pub success_count: usize,
    pub total_count: usize,
    #[serde(skip)]
    pub failed_ids: Vec<i64>,
}

impl BatchRevokeResult {
    pub fn message(&self) -> String {
        format!(
            "{} of {} approvals revoked successfully",
            self.success_count, self.total_count
        )
    }
}

/// Marks stored approvals as revoked. Nothing is sent on-chain.
#[derive(Clone)]
pub struct RevocationHandler {
    store: Arc<dyn ApprovalStore>,
}

impl RevocationHandler {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self { store }
    }

    /// Returns `false` when no record has this id. Revoking twice succeeds twice.
    pub async fn revoke(&self, id: i64) -> Result<bool, StoreError> {
        let revoked = self.store.revoke(id).await?;
        if revoked {
            info!("Revoked approval {}", id);
        } else {
            warn!("Approval {} not found, nothing to revoke", id);
        }
        Ok(revoked)
    }

    /// Revokes each id independently. A store failure on one id counts as a
    /// failed revocation and does not affect the others.
    pub async fn revoke_many(&self, ids: &[i64]) -> BatchRevokeResult {
        let outcomes = join_all(ids.iter().map(|&id| async move {
            match self.revoke(id).await {
                Ok(revoked) => (id, revoked),
                Err(e) => {
                    warn!("Failed to revoke approval {}: {}", id, e);
                    (id, false)
                }
            }
        }))
        .await;

        let failed_ids: Vec<i64> = outcomes
            .iter()
            .filter(|(_, revoked)| !revoked)
            .map(|(id, _)| *id)
            .collect();

        let result = BatchRevokeResult {
            success_count: outcomes.len() - failed_ids.len(),
            total_count: outcomes.len(),
            failed_ids,
        };
        info!("{}", result.message());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::Chain;
    use crate::repository::{MemoryApprovalStore, NewApproval, TokenType};
    use alloy_primitives::Address;

    async fn seeded(count: u8) -> Arc<MemoryApprovalStore> {
        let store = Arc::new(MemoryApprovalStore::new());
        for i in 0..count {
            store
                .create(NewApproval {
                    user_id: None,
                    wallet_address: Address::repeat_byte(0xa1),
                    contract_address: Address::repeat_byte(i + 1),
                    token_name: "Token".into(),
                    token_symbol: "TKN".into(),
                    token_type: TokenType::Token,
                    spender_address: Address::repeat_byte(0xb2),
                    approved_amount: "Unlimited".into(),
                    chain: Chain::Ethereum,
                    is_unlimited: true,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn revoke_is_repeatable() {
        let store = seeded(1).await;
        let handler = RevocationHandler::new(store.clone());

        assert!(handler.revoke(1).await.unwrap());
        assert!(handler.revoke(1).await.unwrap());
        assert!(store.get(1).await.unwrap().unwrap().is_revoked);
        assert!(!handler.revoke(42).await.unwrap());
    }

    #[tokio::test]
    async fn batch_counts_missing_ids_as_failures() {
        let handler = RevocationHandler::new(seeded(2).await);

        let result = handler.revoke_many(&[1, 2, 999]).await;

        assert_eq!(result.success_count, 2);
        assert_eq!(result.total_count, 3);
        assert_eq!(result.failed_ids, vec![999]);
        assert_eq!(result.message(), "2 of 3 approvals revoked successfully");
    }

    #[tokio::test]
    async fn empty_batch_revokes_nothing() {
        let handler = RevocationHandler::new(seeded(1).await);
        let result = handler.revoke_many(&[]).await;
        assert_eq!((result.success_count, result.total_count), (0, 0));
    }

    #[test]
    fn batch_result_serializes_counts_only() {
        let result = BatchRevokeResult {
            success_count: 2,
            total_count: 3,
            failed_ids: vec![999],
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::json!({"successCount": 2, "totalCount": 3})
        );
    }
}
