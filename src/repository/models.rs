use crate::chains::Chain;
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenType {
    Token,
    #[serde(rename = "NFT")]
    Nft,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Token => "Token",
            TokenType::Nft => "NFT",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Token" => Ok(TokenType::Token),
            "NFT" => Ok(TokenType::Nft),
            other => Err(format!("unknown token type {other}")),
        }
    }
}

/// A stored spending approval. `id` and the timestamps belong to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: i64,
    pub user_id: Option<i64>,
    pub wallet_address: Address,
    pub contract_address: Address,
    pub token_name: String,
    pub token_symbol: String,
    pub token_type: TokenType,
    pub spender_address: Address,
    pub approved_amount: String,
    pub chain: Chain,
    pub is_unlimited: bool,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewApproval {
    pub user_id: Option<i64>,
    pub wallet_address: Address,
    pub contract_address: Address,
    pub token_name: String,
    pub token_symbol: String,
    pub token_type: TokenType,
    pub spender_address: Address,
    pub approved_amount: String,
    pub chain: Chain,
    pub is_unlimited: bool,
}

/// Fields refreshed when an approval is rediscovered on chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApprovalUpdate {
    pub token_name: Option<String>,
    pub token_symbol: Option<String>,
    pub token_type: Option<TokenType>,
    pub spender_address: Option<Address>,
    pub approved_amount: Option<String>,
    pub is_unlimited: Option<bool>,
}

impl ApprovalUpdate {
    pub fn is_empty(&self) -> bool {
        *self == ApprovalUpdate::default()
    }

    pub(crate) fn apply(self, approval: &mut Approval) {
        if let Some(name) = self.token_name {
            approval.token_name = name;
        }
        if let Some(symbol) = self.token_symbol {
            approval.token_symbol = symbol;
        }
        if let Some(token_type) = self.token_type {
            approval.token_type = token_type;
        }
        if let Some(spender) = self.spender_address {
            approval.spender_address = spender;
        }
        if let Some(amount) = self.approved_amount {
            approval.approved_amount = amount;
        }
        if let Some(unlimited) = self.is_unlimited {
            approval.is_unlimited = unlimited;
        }
    }
}

/// Next `updated_at` for a record, never earlier than its creation.
pub(crate) fn touch(created_at: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(created_at)
}
