use crate::chains::Chain;
use crate::decoder::ApprovalEvent;
use crate::error::StoreError;
use crate::repository::{Approval, ApprovalStore, ApprovalUpdate, NewApproval};
use alloy_primitives::Address;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Turns freshly decoded approval events into stored approval records.
#[derive(Clone)]
pub struct ApprovalReconciler {
    store: Arc<dyn ApprovalStore>,
}

impl ApprovalReconciler {
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self { store }
    }

    /// Records are keyed by contract address within a wallet and chain.
    ///
    /// Events must be ordered most recent first: only the first event per
    /// contract is applied. An existing unrevoked record is refreshed when
    /// the latest on-chain approval differs from it. With no events at all
    /// (empty history or a failed fetch) the stored records are returned.
    pub async fn reconcile(
        &self,
        chain: Chain,
        wallet: Address,
        events: &[ApprovalEvent],
    ) -> Result<Vec<Approval>, StoreError> {
        if events.is_empty() {
            let stored = self.store.list_by_wallet(wallet, chain).await?;
            info!(
                "No approvals discovered for {:?} on {}, returning {} stored records",
                wallet,
                chain,
                stored.len()
            );
            return Ok(stored);
        }

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut created = 0;
        let mut refreshed = 0;

        for event in events {
            if !seen.insert(event.contract_address) {
                continue;
            }

            let existing = self
                .store
                .find_by_contract(wallet, chain, event.contract_address)
                .await?;

            let record = match existing {
                Some(existing) if existing.is_revoked => existing,
                Some(existing) => {
                    let update = rediscovery_update(&existing, event);
                    if update.is_empty() {
                        existing
                    } else {
                        debug!(
                            "Refreshing approval {} for contract {:?}",
                            existing.id, event.contract_address
                        );
                        refreshed += 1;
                        let id = existing.id;
                        self.store.update(id, update).await?.unwrap_or(existing)
                    }
                }
                None => {
                    created += 1;
                    self.store.create(new_approval(chain, wallet, event)).await?
                }
            };
            records.push(record);
        }

        info!(
            "Reconciled {} approvals for {:?} on {} ({} new, {} refreshed)",
            records.len(),
            wallet,
            chain,
            created,
            refreshed
        );
        Ok(records)
    }
}

fn new_approval(chain: Chain, wallet: Address, event: &ApprovalEvent) -> NewApproval {
    NewApproval {
        user_id: None,
        wallet_address: wallet,
        contract_address: event.contract_address,
        token_name: event.token_name.clone(),
        token_symbol: event.token_symbol.clone(),
        token_type: event.token_type,
        spender_address: event.spender_address,
        approved_amount: event.value.clone(),
        chain,
        is_unlimited: event.is_unlimited,
    }
}

fn rediscovery_update(existing: &Approval, event: &ApprovalEvent) -> ApprovalUpdate {
    fn changed<T: PartialEq + Clone>(current: &T, latest: &T) -> Option<T> {
        (current != latest).then(|| latest.clone())
    }

    ApprovalUpdate {
        token_name: changed(&existing.token_name, &event.token_name),
        token_symbol: changed(&existing.token_symbol, &event.token_symbol),
        token_type: changed(&existing.token_type, &event.token_type),
        spender_address: changed(&existing.spender_address, &event.spender_address),
        approved_amount: changed(&existing.approved_amount, &event.value),
        is_unlimited: changed(&existing.is_unlimited, &event.is_unlimited),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryApprovalStore, TokenType};

    const WALLET: Address = Address::repeat_byte(0xa1);

    fn event(contract: u8, spender: u8, value: &str) -> ApprovalEvent {
        ApprovalEvent {
            transaction_hash: format!("0x{contract:02x}{spender:02x}"),
            block_number: 1,
            timestamp: 0,
            from: WALLET,
            to: Address::repeat_byte(contract),
            token_name: "Token".into(),
            token_symbol: "TKN".into(),
            token_decimal: 18,
            contract_address: Address::repeat_byte(contract),
            spender_address: Address::repeat_byte(spender),
            value: value.into(),
            token_type: TokenType::Token,
            is_unlimited: value == "Unlimited",
        }
    }

    fn reconciler() -> (ApprovalReconciler, Arc<MemoryApprovalStore>) {
        let store = Arc::new(MemoryApprovalStore::new());
        (ApprovalReconciler::new(store.clone()), store)
    }

    #[tokio::test]
    async fn creates_one_record_per_contract_in_order() {
        let (reconciler, _) = reconciler();
        let events = vec![
            event(0xc3, 0xb2, "Unlimited"),
            event(0xe5, 0xd4, "10"),
            event(0xc3, 0xb9, "5"),
        ];

        let records = reconciler
            .reconcile(Chain::Ethereum, WALLET, &events)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].contract_address, Address::repeat_byte(0xc3));
        assert_eq!(records[0].spender_address, Address::repeat_byte(0xb2));
        assert!(records[0].is_unlimited);
        assert_eq!(records[1].contract_address, Address::repeat_byte(0xe5));
        assert!(records.iter().all(|r| !r.is_revoked));
    }

    #[tokio::test]
    async fn rerun_reuses_stored_ids() {
        let (reconciler, _) = reconciler();
        let events = vec![event(0xc3, 0xb2, "Unlimited"), event(0xe5, 0xd4, "10")];

        let first = reconciler
            .reconcile(Chain::Base, WALLET, &events)
            .await
            .unwrap();
        let second = reconciler
            .reconcile(Chain::Base, WALLET, &events)
            .await
            .unwrap();

        let ids = |records: &[Approval]| records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rediscovery_refreshes_changed_allowance() {
        let (reconciler, _) = reconciler();
        let first = reconciler
            .reconcile(Chain::Ethereum, WALLET, &[event(0xc3, 0xb2, "Unlimited")])
            .await
            .unwrap();

        let second = reconciler
            .reconcile(Chain::Ethereum, WALLET, &[event(0xc3, 0xb7, "1000")])
            .await
            .unwrap();

        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].spender_address, Address::repeat_byte(0xb7));
        assert_eq!(second[0].approved_amount, "1000");
        assert!(!second[0].is_unlimited);
    }

    #[tokio::test]
    async fn revoked_records_are_left_alone() {
        let (reconciler, store) = reconciler();
        let first = reconciler
            .reconcile(Chain::Ethereum, WALLET, &[event(0xc3, 0xb2, "Unlimited")])
            .await
            .unwrap();
        store.revoke(first[0].id).await.unwrap();

        let second = reconciler
            .reconcile(Chain::Ethereum, WALLET, &[event(0xc3, 0xb7, "1000")])
            .await
            .unwrap();

        assert!(second[0].is_revoked);
        assert_eq!(second[0].spender_address, Address::repeat_byte(0xb2));
    }

    #[tokio::test]
    async fn empty_discovery_falls_back_to_stored_records() {
        let (reconciler, _) = reconciler();
        assert!(
            reconciler
                .reconcile(Chain::Celo, WALLET, &[])
                .await
                .unwrap()
                .is_empty()
        );

        reconciler
            .reconcile(Chain::Celo, WALLET, &[event(0xc3, 0xb2, "Unlimited")])
            .await
            .unwrap();

        let fallback = reconciler.reconcile(Chain::Celo, WALLET, &[]).await.unwrap();
        assert_eq!(fallback.len(), 1);
        assert!(
            reconciler
                .reconcile(Chain::Ethereum, WALLET, &[])
                .await
                .unwrap()
                .is_empty()
        );
    }
}
