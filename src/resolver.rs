use crate::chains::ChainEndpoint;
use crate::explorer::{Explorer, TokenInfo};
use alloy_primitives::Address;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Symbol reported when the explorer has no token metadata.
pub const UNKNOWN_SYMBOL: &str = "UNKNOWN";
/// Decimals assumed when the explorer has no token metadata.
pub const DEFAULT_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContractKind {
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    Erc1155,
}

impl ContractKind {
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();
        match normalized.as_str() {
            "ERC20" => Some(ContractKind::Erc20),
            "ERC721" => Some(ContractKind::Erc721),
            "ERC1155" => Some(ContractKind::Erc1155),
            _ => None,
        }
    }

    pub fn is_nft(&self) -> bool {
        matches!(self, ContractKind::Erc721 | ContractKind::Erc1155)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// `None` when the explorer did not report a token standard.
    pub kind: Option<ContractKind>,
}

/// Looks up human-readable contract metadata.
///
/// Resolution happens in two stages: the contract must have verified source
/// (otherwise there is nothing to show), then token metadata is layered on
/// top. A missing second stage only degrades the result.
#[derive(Clone)]
pub struct ContractResolver {
    explorer: Arc<dyn Explorer>,
}

impl ContractResolver {
    pub fn new(explorer: Arc<dyn Explorer>) -> Self {
        Self { explorer }
    }

    pub async fn resolve(&self, endpoint: &ChainEndpoint, address: Address) -> Option<ContractInfo> {
        let source = match self.explorer.contract_source(endpoint, address).await {
            Ok(Some(source)) => source,
            Ok(None) => {
                debug!("Contract {:?} has no verified source", address);
                return None;
            }
            Err(e) => {
                warn!("Failed to fetch contract source for {:?}: {}", address, e);
                return None;
            }
        };

        let token = match self.explorer.token_info(endpoint, address).await {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No token metadata for {:?}, using defaults", address);
                TokenInfo::default()
            }
            Err(e) => {
                warn!("Failed to fetch token metadata for {:?}: {}", address, e);
                TokenInfo::default()
            }
        };

        Some(ContractInfo {
            address,
            name: token.name.unwrap_or(source.contract_name),
            symbol: token.symbol.unwrap_or_else(|| UNKNOWN_SYMBOL.to_string()),
            decimals: token.decimals.unwrap_or(DEFAULT_DECIMALS),
            kind: token.token_type.as_deref().and_then(ContractKind::parse),
        })
    }

    /// Resolves each distinct address once, at most `concurrency` at a time.
    /// Addresses that cannot be resolved are absent from the result.
    pub async fn resolve_all(
        &self,
        endpoint: &ChainEndpoint,
        addresses: &[Address],
        concurrency: usize,
    ) -> HashMap<Address, ContractInfo> {
        let mut unique = addresses.to_vec();
        unique.sort();
        unique.dedup();
        let requested = unique.len();

        let resolved: HashMap<Address, ContractInfo> = stream::iter(unique)
            .map(|address| async move { (address, self.resolve(endpoint, address).await) })
            .buffered(concurrency.max(1))
            .filter_map(|(address, info)| async move { info.map(|info| (address, info)) })
            .collect()
            .await;

        info!(
            "Resolved {} of {} referenced contracts",
            resolved.len(),
            requested
        );
        resolved
    }
}
