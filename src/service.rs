use crate::abi::allowanceCall;
use crate::chains::{Chain, ChainRegistry};
use crate::config::{Config, StorageBackend};
use crate::decoder::ApprovalDecoder;
use crate::error::ApprovalError;
use crate::explorer::Explorer;
use crate::fetcher::TransactionFetcher;
use crate::reconciler::ApprovalReconciler;
use crate::repository::{
    Approval, ApprovalStore, Database, MemoryApprovalStore, NewApproval, SqliteApprovalStore,
    TokenType,
};
use crate::resolver::ContractResolver;
use crate::revocation::{BatchRevokeResult, RevocationHandler};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use regex::Regex;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("Invalid address regex"));

/// Parses a `0x`-prefixed 20-byte hex address, in any letter case.
pub fn parse_address(value: &str) -> Result<Address, ApprovalError> {
    let value = value.trim();
    if !ADDRESS_RE.is_match(value) {
        return Err(ApprovalError::InvalidAddress(value.to_string()));
    }
    Address::from_str(value).map_err(|_| ApprovalError::InvalidAddress(value.to_string()))
}

/// Opens the store selected by `STORAGE_BACKEND`.
pub fn open_store(config: &Config) -> Result<Arc<dyn ApprovalStore>> {
    Ok(match config.storage_backend {
        StorageBackend::Memory => Arc::new(MemoryApprovalStore::new()),
        StorageBackend::Sqlite => {
            Arc::new(SqliteApprovalStore::new(Database::new(&config.database_url)?))
        }
    })
}

/// Fields for a manually entered approval record.
#[derive(Debug, Clone)]
pub struct CreateApprovalRequest {
    pub user_id: Option<i64>,
    pub wallet_address: String,
    pub contract_address: String,
    pub token_name: String,
    pub token_symbol: String,
    pub token_type: String,
    pub spender_address: String,
    pub approved_amount: String,
    pub chain: String,
    pub is_unlimited: bool,
}

/// Entry point for the approval API: discovery, revocation and record management.
#[derive(Clone)]
pub struct ApprovalService {
    chains: ChainRegistry,
    explorer: Arc<dyn Explorer>,
    store: Arc<dyn ApprovalStore>,
    fetcher: TransactionFetcher,
    resolver: ContractResolver,
    decoder: ApprovalDecoder,
    reconciler: ApprovalReconciler,
    revocations: RevocationHandler,
    lookup_concurrency: usize,
}

impl ApprovalService {
    pub fn new(config: &Config, explorer: Arc<dyn Explorer>, store: Arc<dyn ApprovalStore>) -> Self {
        Self {
            chains: config.chains.clone(),
            fetcher: TransactionFetcher::new(explorer.clone()),
            resolver: ContractResolver::new(explorer.clone()),
            decoder: ApprovalDecoder::new(config.unlimited_threshold),
            reconciler: ApprovalReconciler::new(store.clone()),
            revocations: RevocationHandler::new(store.clone()),
            lookup_concurrency: config.lookup_concurrency,
            explorer,
            store,
        }
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    /// Discovers the wallet's approvals on `chain` and returns the matching
    /// stored records, creating or refreshing them as needed.
    ///
    /// Explorer failures never fail the call: the result falls back to what
    /// is already stored for this wallet and chain.
    pub async fn list_approvals(
        &self,
        wallet: &str,
        chain: &str,
    ) -> Result<Vec<Approval>, ApprovalError> {
        if wallet.trim().is_empty() || chain.trim().is_empty() {
            return Err(ApprovalError::InvalidRequest(
                "wallet address and chain are required".to_string(),
            ));
        }
        let endpoint = self.chains.resolve(chain)?;
        let wallet = parse_address(wallet)?;

        if !self.chains.has_api_key(endpoint.chain) {
            warn!(
                "No API key configured for {}, explorer requests may be rate limited",
                endpoint.chain
            );
        }

        let transactions = self.fetcher.fetch(&endpoint, wallet).await;
        let events = self
            .decoder
            .decode(
                &self.resolver,
                &endpoint,
                wallet,
                &transactions,
                self.lookup_concurrency,
            )
            .await;

        Ok(self
            .reconciler
            .reconcile(endpoint.chain, wallet, &events)
            .await?)
    }

    pub async fn revoke_approval(&self, id: i64) -> Result<bool, ApprovalError> {
        Ok(self.revocations.revoke(id).await?)
    }

    pub async fn batch_revoke_approvals(
        &self,
        ids: &[i64],
    ) -> Result<BatchRevokeResult, ApprovalError> {
        if ids.is_empty() {
            return Err(ApprovalError::InvalidRequest(
                "approval ids must be a non-empty list".to_string(),
            ));
        }
        Ok(self.revocations.revoke_many(ids).await)
    }

    pub async fn get_approval(&self, id: i64) -> Result<Option<Approval>, ApprovalError> {
        Ok(self.store.get(id).await?)
    }

    /// Stored records without scanning, optionally narrowed to one owner
    /// and one chain.
    pub async fn stored_approvals(
        &self,
        user_id: Option<i64>,
        chain: Option<&str>,
    ) -> Result<Vec<Approval>, ApprovalError> {
        let Some(chain) = chain else {
            return Ok(self.store.list(user_id).await?);
        };

        let chain: Chain = chain.parse()?;
        let mut approvals = self.store.list_by_chain(chain).await?;
        if user_id.is_some() {
            approvals.retain(|approval| approval.user_id == user_id);
        }
        Ok(approvals)
    }

    pub async fn create_approval(
        &self,
        request: CreateApprovalRequest,
    ) -> Result<Approval, ApprovalError> {
        let chain: Chain = request.chain.parse()?;
        let token_type = TokenType::from_str(&request.token_type)
            .map_err(ApprovalError::InvalidRequest)?;
        if request.token_name.trim().is_empty() || request.token_symbol.trim().is_empty() {
            return Err(ApprovalError::InvalidRequest(
                "token name and symbol are required".to_string(),
            ));
        }
        if request.approved_amount.trim().is_empty() {
            return Err(ApprovalError::InvalidRequest(
                "approved amount is required".to_string(),
            ));
        }

        let approval = self
            .store
            .create(NewApproval {
                user_id: request.user_id,
                wallet_address: parse_address(&request.wallet_address)?,
                contract_address: parse_address(&request.contract_address)?,
                token_name: request.token_name,
                token_symbol: request.token_symbol,
                token_type,
                spender_address: parse_address(&request.spender_address)?,
                approved_amount: request.approved_amount,
                chain,
                is_unlimited: request.is_unlimited,
            })
            .await?;
        info!("Created approval {} on {}", approval.id, approval.chain);
        Ok(approval)
    }

    pub async fn delete_approval(&self, id: i64) -> Result<bool, ApprovalError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!("Deleted approval {}", id);
        }
        Ok(deleted)
    }

    /// Reads `allowance(wallet, spender)` from the token contract.
    ///
    /// Only invalid input is an error; any upstream failure reads as zero.
    pub async fn current_allowance(
        &self,
        wallet: &str,
        contract: &str,
        spender: &str,
        chain: &str,
    ) -> Result<U256, ApprovalError> {
        let endpoint = self.chains.resolve(chain)?;
        let owner = parse_address(wallet)?;
        let contract = parse_address(contract)?;
        let spender = parse_address(spender)?;

        let data = allowanceCall { owner, spender }.abi_encode();
        let output = match self.explorer.call(&endpoint, contract, data.into()).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to read allowance on {:?}: {}", contract, e);
                return Ok(U256::ZERO);
            }
        };

        match allowanceCall::abi_decode_returns(&output) {
            Ok(allowance) => Ok(allowance),
            Err(e) => {
                warn!("Unexpected allowance response from {:?}: {}", contract, e);
                Ok(U256::ZERO)
            }
        }
    }
}
