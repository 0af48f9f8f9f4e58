use crate::error::ApprovalError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Base,
    Arbitrum,
    Celo,
}

/// Static explorer details for a supported chain.
#[derive(Debug, Clone, Copy)]
pub struct ChainInfo {
    pub chain: Chain,
    pub name: &'static str,
    pub chain_id: u64,
    pub api_url: &'static str,
    pub explorer_url: &'static str,
    pub api_key_var: &'static str,
}

const CHAINS: [ChainInfo; 4] = [
    ChainInfo {
        chain: Chain::Ethereum,
        name: "Ethereum",
        chain_id: 1,
        api_url: "https://api.etherscan.io/api",
        explorer_url: "https://etherscan.io",
        api_key_var: "ETHERSCAN_API_KEY",
    },
    ChainInfo {
        chain: Chain::Base,
        name: "Base",
        chain_id: 8453,
        api_url: "https://api.basescan.org/api",
        explorer_url: "https://basescan.org",
        api_key_var: "BASESCAN_API_KEY",
    },
    ChainInfo {
        chain: Chain::Arbitrum,
        name: "Arbitrum",
        chain_id: 42161,
        api_url: "https://api.arbiscan.io/api",
        explorer_url: "https://arbiscan.io",
        api_key_var: "ARBISCAN_API_KEY",
    },
    ChainInfo {
        chain: Chain::Celo,
        name: "Celo",
        chain_id: 42220,
        api_url: "https://api.celoscan.io/api",
        explorer_url: "https://celoscan.io",
        api_key_var: "CELOSCAN_API_KEY",
    },
];

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Ethereum, Chain::Base, Chain::Arbitrum, Chain::Celo];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::Arbitrum => "arbitrum",
            Chain::Celo => "celo",
        }
    }

    pub fn info(&self) -> &'static ChainInfo {
        match self {
            Chain::Ethereum => &CHAINS[0],
            Chain::Base => &CHAINS[1],
            Chain::Arbitrum => &CHAINS[2],
            Chain::Celo => &CHAINS[3],
        }
    }

    /// Explorer page for an address on this chain.
    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.info().explorer_url, address)
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" => Ok(Chain::Ethereum),
            "base" => Ok(Chain::Base),
            "arbitrum" => Ok(Chain::Arbitrum),
            "celo" => Ok(Chain::Celo),
            _ => Err(ApprovalError::UnsupportedChain(s.to_string())),
        }
    }
}

/// A chain resolved together with the credentials to query its explorer.
#[derive(Debug, Clone)]
pub struct ChainEndpoint {
    pub chain: Chain,
    pub api_url: String,
    pub api_key: Option<String>,
}

/// Maps chain identifiers to explorer endpoints and API keys.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    api_keys: HashMap<Chain, String>,
    fallback_key: Option<String>,
    api_url_overrides: HashMap<Chain, String>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose keys come from the per-chain environment variables,
    /// with `ETHERSCAN_API_KEY` as the shared fallback.
    pub fn from_env() -> Self {
        let mut registry = Self::new();
        for chain in Chain::ALL {
            if let Some(key) = non_empty_var(chain.info().api_key_var) {
                registry.api_keys.insert(chain, key);
            }
        }
        registry.fallback_key = non_empty_var("ETHERSCAN_API_KEY");
        registry
    }

    pub fn with_api_key(mut self, chain: Chain, api_key: impl Into<String>) -> Self {
        self.api_keys.insert(chain, api_key.into());
        self
    }

    /// Point a chain at a different explorer API base URL.
    pub fn with_api_url(mut self, chain: Chain, api_url: impl Into<String>) -> Self {
        self.api_url_overrides.insert(chain, api_url.into());
        self
    }

    pub fn has_api_key(&self, chain: Chain) -> bool {
        self.api_keys.contains_key(&chain) || self.fallback_key.is_some()
    }

    pub fn resolve(&self, chain: &str) -> Result<ChainEndpoint, ApprovalError> {
        let chain = Chain::from_str(chain)?;
        Ok(self.endpoint(chain))
    }

    /// Every supported chain, in registry order.
    pub fn endpoints(&self) -> impl Iterator<Item = ChainEndpoint> + '_ {
        Chain::ALL.into_iter().map(|chain| self.endpoint(chain))
    }

    pub fn endpoint(&self, chain: Chain) -> ChainEndpoint {
        let api_url = self
            .api_url_overrides
            .get(&chain)
            .cloned()
            .unwrap_or_else(|| chain.info().api_url.to_string());
        let api_key = self
            .api_keys
            .get(&chain)
            .or(self.fallback_key.as_ref())
            .cloned();

        ChainEndpoint {
            chain,
            api_url,
            api_key,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_chains_case_insensitively() {
        let registry = ChainRegistry::new();
        let endpoint = registry.resolve("Base").unwrap();
        assert_eq!(endpoint.chain, Chain::Base);
        assert_eq!(endpoint.api_url, "https://api.basescan.org/api");
        assert!(endpoint.api_key.is_none());
    }

    #[test]
    fn unknown_chain_is_rejected() {
        let err = ChainRegistry::new().resolve("solana").unwrap_err();
        assert!(matches!(err, ApprovalError::UnsupportedChain(ref c) if c == "solana"));
    }

    #[test]
    fn per_chain_key_wins() {
        let registry = ChainRegistry::new().with_api_key(Chain::Celo, "celo-key");
        assert_eq!(
            registry.endpoint(Chain::Celo).api_key.as_deref(),
            Some("celo-key")
        );
        assert!(registry.endpoint(Chain::Ethereum).api_key.is_none());
    }

    #[test]
    fn builds_explorer_links() {
        assert_eq!(
            Chain::Arbitrum.address_url("0xdef"),
            "https://arbiscan.io/address/0xdef"
        );
    }

    #[test]
    fn api_url_override_keeps_credentials() {
        let registry = ChainRegistry::new()
            .with_api_key(Chain::Base, "base-key")
            .with_api_url(Chain::Base, "http://127.0.0.1:9/api");

        let endpoint = registry.endpoint(Chain::Base);
        assert_eq!(endpoint.api_url, "http://127.0.0.1:9/api");
        assert_eq!(endpoint.api_key.as_deref(), Some("base-key"));
        assert!(registry.has_api_key(Chain::Base));
        assert!(!registry.has_api_key(Chain::Celo));
        assert_eq!(
            registry.endpoint(Chain::Ethereum).api_url,
            "https://api.etherscan.io/api"
        );
    }
}
