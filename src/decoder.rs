//! Recognises approval-granting calls in a wallet's transaction history.
//!
//! Calls are matched on their 4-byte selector against [`APPROVAL_METHODS`].
//! Adding another approval-granting method (a permit variant, say) means
//! adding a row to that table with its own argument decoder.

use crate::abi::{approveCall, setApprovalForAllCall};
use crate::chains::ChainEndpoint;
use crate::explorer::RawTransaction;
use crate::repository::TokenType;
use crate::resolver::{ContractInfo, ContractKind, ContractResolver};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, info};

/// Display value for an allowance classified as unlimited.
pub const UNLIMITED_VALUE: &str = "Unlimited";
/// Display value for a collection-wide operator approval.
pub const ALL_ITEMS_VALUE: &str = "All NFTs";
/// Display value once an operator approval has been withdrawn.
pub const CLEARED_VALUE: &str = "0";

/// What an approval-shaped call hands to a third party.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// `approve(spender, amount)`: a spending allowance, or a single NFT id.
    Allowance { spender: Address, amount: U256 },
    /// `setApprovalForAll(operator, approved)`: every item in a collection.
    Operator { operator: Address, approved: bool },
}

/// Why a transaction is not an approval. Expected for most transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeSkip {
    Reverted,
    NotOwner,
    NoTarget,
    ShortCalldata,
    UnknownSelector,
    Malformed,
}

pub struct ApprovalMethod {
    pub selector: [u8; 4],
    pub signature: &'static str,
    /// Number of 32-byte argument words the method takes.
    pub arg_words: usize,
    pub decode: fn(&[u8]) -> Result<Grant, DecodeSkip>,
}

impl ApprovalMethod {
    fn min_calldata_len(&self) -> usize {
        4 + 32 * self.arg_words
    }
}

pub static APPROVAL_METHODS: &[ApprovalMethod] = &[
    ApprovalMethod {
        selector: approveCall::SELECTOR,
        signature: approveCall::SIGNATURE,
        arg_words: 2,
        decode: decode_approve,
    },
    ApprovalMethod {
        selector: setApprovalForAllCall::SELECTOR,
        signature: setApprovalForAllCall::SIGNATURE,
        arg_words: 2,
        decode: decode_set_approval_for_all,
    },
];

fn decode_approve(calldata: &[u8]) -> Result<Grant, DecodeSkip> {
    let call = approveCall::abi_decode(calldata).map_err(|_| DecodeSkip::Malformed)?;
    Ok(Grant::Allowance {
        spender: call.spender,
        amount: call.value,
    })
}

fn decode_set_approval_for_all(calldata: &[u8]) -> Result<Grant, DecodeSkip> {
    let call = setApprovalForAllCall::abi_decode(calldata).map_err(|_| DecodeSkip::Malformed)?;
    Ok(Grant::Operator {
        operator: call.operator,
        approved: call.approved,
    })
}

pub fn method_for(selector: &[u8]) -> Option<&'static ApprovalMethod> {
    APPROVAL_METHODS
        .iter()
        .find(|method| method.selector.as_slice() == selector)
}

/// An approval call found in a transaction, before contract metadata is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApprovalCall<'a> {
    pub transaction: &'a RawTransaction,
    pub contract: Address,
    pub method: &'static str,
    pub grant: Grant,
}

/// A decoded approval enriched with contract metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    pub transaction_hash: String,
    pub block_number: u64,
    pub timestamp: u64,
    pub from: Address,
    pub to: Address,
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimal: u8,
    pub contract_address: Address,
    pub spender_address: Address,
    pub value: String,
    pub token_type: TokenType,
    pub is_unlimited: bool,
}

/// Inspect a single transaction sent by `owner`.
pub fn classify(owner: Address, tx: &RawTransaction) -> Result<ApprovalCall<'_>, DecodeSkip> {
    if tx.is_error {
        return Err(DecodeSkip::Reverted);
    }
    if tx.from != owner {
        return Err(DecodeSkip::NotOwner);
    }
    let contract = tx.to.ok_or(DecodeSkip::NoTarget)?;

    let input = tx.input.as_ref();
    if input.len() < 4 {
        return Err(DecodeSkip::ShortCalldata);
    }
    let method = method_for(&input[..4]).ok_or(DecodeSkip::UnknownSelector)?;
    if input.len() < method.min_calldata_len() {
        return Err(DecodeSkip::ShortCalldata);
    }

    let grant = (method.decode)(input)?;

    Ok(ApprovalCall {
        transaction: tx,
        contract,
        method: method.signature,
        grant,
    })
}

#[derive(Debug, Clone)]
pub struct ApprovalDecoder {
    unlimited_threshold: U256,
}

impl ApprovalDecoder {
    /// `unlimited_threshold` is a heuristic cutoff, not the `type(uint256).max`
    /// sentinel: any allowance strictly above it is reported as unlimited,
    /// regardless of the token's decimals.
    pub fn new(unlimited_threshold: U256) -> Self {
        Self {
            unlimited_threshold,
        }
    }

    pub fn is_unlimited(&self, amount: U256) -> bool {
        amount > self.unlimited_threshold
    }

    /// Lazily yields the approval calls `owner` made, in input order.
    /// Transactions that are not approvals are skipped.
    pub fn candidates<'a>(
        &self,
        owner: Address,
        transactions: &'a [RawTransaction],
    ) -> impl Iterator<Item = ApprovalCall<'a>> + 'a {
        transactions
            .iter()
            .filter_map(move |tx| match classify(owner, tx) {
                Ok(call) => Some(call),
                Err(reason) => {
                    if reason != DecodeSkip::UnknownSelector {
                        debug!("Skipping transaction {}: {:?}", tx.hash, reason);
                    }
                    None
                }
            })
    }

    /// Classifies one call against its contract's metadata.
    ///
    /// `approve` on a contract reported as ERC721 names a token id, so it is
    /// shown as `Token #<id>` and never compared against the unlimited
    /// threshold. `setApprovalForAll(_, false)` yields a bounded NFT event
    /// with value `0`, superseding any earlier operator grant.
    pub fn to_event(&self, call: &ApprovalCall<'_>, contract: &ContractInfo) -> ApprovalEvent {
        let tx = call.transaction;
        let is_nft_contract = contract.kind.is_some_and(|kind| kind.is_nft());

        let (spender, value, token_type, is_unlimited, token_decimal) = match call.grant {
            Grant::Operator {
                operator,
                approved: true,
            } => (operator, ALL_ITEMS_VALUE.to_string(), TokenType::Nft, true, 0),
            Grant::Operator {
                operator,
                approved: false,
            } => (operator, CLEARED_VALUE.to_string(), TokenType::Nft, false, 0),
            // ERC721 approve names a single token id, not an amount.
            Grant::Allowance { spender, amount }
                if contract.kind == Some(ContractKind::Erc721) =>
            {
                (spender, format!("Token #{amount}"), TokenType::Nft, false, 0)
            }
            Grant::Allowance { spender, amount } => {
                let is_unlimited = self.is_unlimited(amount);
                let value = if is_unlimited {
                    UNLIMITED_VALUE.to_string()
                } else {
                    amount.to_string()
                };
                let token_type = if is_nft_contract {
                    TokenType::Nft
                } else {
                    TokenType::Token
                };
                (spender, value, token_type, is_unlimited, contract.decimals)
            }
        };

        ApprovalEvent {
            transaction_hash: tx.hash.clone(),
            block_number: tx.block_number,
            timestamp: tx.timestamp,
            from: tx.from,
            to: call.contract,
            token_name: contract.name.clone(),
            token_symbol: contract.symbol.clone(),
            token_decimal,
            contract_address: call.contract,
            spender_address: spender,
            value,
            token_type,
            is_unlimited,
        }
    }

    /// Decodes every approval `owner` made, resolving each referenced
    /// contract once. Approvals on contracts that cannot be resolved are
    /// dropped. Output keeps transaction order.
    pub async fn decode(
        &self,
        resolver: &ContractResolver,
        endpoint: &ChainEndpoint,
        owner: Address,
        transactions: &[RawTransaction],
        concurrency: usize,
    ) -> Vec<ApprovalEvent> {
        let calls: Vec<ApprovalCall<'_>> = self.candidates(owner, transactions).collect();
        if calls.is_empty() {
            debug!("No approval calls among {} transactions", transactions.len());
            return Vec::new();
        }

        let contracts: Vec<Address> = calls.iter().map(|call| call.contract).collect();
        let resolved = resolver.resolve_all(endpoint, &contracts, concurrency).await;

        let events: Vec<ApprovalEvent> = calls
            .iter()
            .filter_map(|call| match resolved.get(&call.contract) {
                Some(info) => Some(self.to_event(call, info)),
                None => {
                    debug!(
                        "Dropping {} in {}: contract {:?} unresolved",
                        call.method, call.transaction.hash, call.contract
                    );
                    None
                }
            })
            .collect();

        info!(
            "Decoded {} approvals from {} approval calls",
            events.len(),
            calls.len()
        );
        events
    }
}
