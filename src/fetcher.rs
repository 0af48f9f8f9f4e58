use crate::chains::ChainEndpoint;
use crate::explorer::{Explorer, RawTransaction};
use alloy_primitives::Address;
use std::sync::Arc;
use tracing::{info, warn};

/// Pulls a wallet's transaction history from the chain explorer.
///
/// A failed fetch is logged and reported as an empty history.
#[derive(Clone)]
pub struct TransactionFetcher {
    explorer: Arc<dyn Explorer>,
}

impl TransactionFetcher {
    pub fn new(explorer: Arc<dyn Explorer>) -> Self {
        Self { explorer }
    }

    pub async fn fetch(&self, endpoint: &ChainEndpoint, wallet: Address) -> Vec<RawTransaction> {
        match self.explorer.transactions(endpoint, wallet).await {
            Ok(mut transactions) => {
                // Most recent first, whatever order the explorer used.
                transactions.sort_by(|a, b| b.block_number.cmp(&a.block_number));
                info!(
                    "Fetched {} transactions for {:?} on {}",
                    transactions.len(),
                    wallet,
                    endpoint.chain
                );
                transactions
            }
            Err(e) => {
                warn!(
                    "Failed to fetch transactions for {:?} on {}: {}",
                    wallet, endpoint.chain, e
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::{Chain, ChainRegistry};
    use crate::error::ExplorerError;
    use crate::explorer::{ContractSource, TokenInfo};
    use alloy_primitives::Bytes;
    use async_trait::async_trait;

    struct FixedHistory(Result<Vec<u64>, ()>);

    #[async_trait]
    impl Explorer for FixedHistory {
        async fn transactions(
            &self,
            _endpoint: &ChainEndpoint,
            wallet: Address,
        ) -> Result<Vec<RawTransaction>, ExplorerError> {
            match &self.0 {
                Ok(blocks) => Ok(blocks
                    .iter()
                    .map(|block| RawTransaction {
                        hash: format!("0x{block:064x}"),
                        block_number: *block,
                        timestamp: 0,
                        from: wallet,
                        to: None,
                        input: Bytes::new(),
                        is_error: false,
                    })
                    .collect()),
                Err(()) => Err(ExplorerError::Timeout(30)),
            }
        }

        async fn contract_source(
            &self,
            _endpoint: &ChainEndpoint,
            _address: Address,
        ) -> Result<Option<ContractSource>, ExplorerError> {
            Ok(None)
        }

        async fn token_info(
            &self,
            _endpoint: &ChainEndpoint,
            _address: Address,
        ) -> Result<Option<TokenInfo>, ExplorerError> {
            Ok(None)
        }

        async fn call(
            &self,
            _endpoint: &ChainEndpoint,
            _to: Address,
            _data: Bytes,
        ) -> Result<Bytes, ExplorerError> {
            Ok(Bytes::new())
        }
    }

    #[tokio::test]
    async fn orders_most_recent_first() {
        let fetcher = TransactionFetcher::new(Arc::new(FixedHistory(Ok(vec![5, 9, 7]))));
        let endpoint = ChainRegistry::new().endpoint(Chain::Ethereum);

        let txs = fetcher.fetch(&endpoint, Address::ZERO).await;
        let blocks: Vec<u64> = txs.iter().map(|tx| tx.block_number).collect();
        assert_eq!(blocks, vec![9, 7, 5]);
    }

    #[tokio::test]
    async fn failure_reads_as_empty_history() {
        let fetcher = TransactionFetcher::new(Arc::new(FixedHistory(Err(()))));
        let endpoint = ChainRegistry::new().endpoint(Chain::Base);

        assert!(fetcher.fetch(&endpoint, Address::ZERO).await.is_empty());
    }
}
