/// Transforms raw ledger transfers into consumer-facing rows.
///
/// Pure transform plus reads/writes of the shared token metadata cache.
/// No network access happens here.

use crate::types::{
    TokenMeta,
    Transfer,
    TransferEdge,
    TransferToken,
    UiTransfer,
    UiTransferKind,
};
use crate::utils::{ amount_magnitude, evm_addr_eq, safe_amount };
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{ Arc, RwLock };

pub const REEF_DECIMALS: u32 = 18;
const DEFAULT_DECIMALS: u32 = 18;

// =============================================================================
// TOKEN METADATA CACHE
// =============================================================================

/// Bounded, additive cache of resolved token metadata, keyed by contract
/// id. Writes are insert-only; placeholders and heuristic guesses are
/// never stored.
#[derive(Clone)]
pub struct TokenMetaCache {
    inner: Arc<RwLock<HashMap<String, TokenMeta>>>,
    capacity: usize,
}

impl TokenMetaCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, token_id: &str) -> Option<TokenMeta> {
        self.inner.read().unwrap().get(token_id).cloned()
    }

    /// Insert if absent. Returns true when a new entry landed.
    pub fn insert(&self, meta: TokenMeta) -> bool {
        if meta.id.is_empty() {
            return false;
        }
        let mut map = self.inner.write().unwrap();
        if map.contains_key(&meta.id) || map.len() >= self.capacity {
            return false;
        }
        map.insert(meta.id.clone(), meta);
        true
    }

    /// Prime the cache from a batch of raw tokens. Returns how many new
    /// entries were added, so callers can decide whether anything changed.
    pub fn prime(&self, tokens: &[TransferToken]) -> usize {
        let mut added = 0;
        for token in tokens {
            if token.id.is_empty() || self.get(&token.id).is_some() {
                continue;
            }
            if let Some(meta) = parse_contract_data(token) {
                if self.insert(meta) {
                    added += 1;
                }
            }
        }
        added
    }

    pub fn clear(&self) {
        self.inner.write().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// MAPPING
// =============================================================================

pub struct TransferMapper {
    cache: TokenMetaCache,
}

impl TransferMapper {
    pub fn new(cache: TokenMetaCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &TokenMetaCache {
        &self.cache
    }

    /// Map a page of edges for `user_address`. Empty address and missing
    /// nodes yield empty/dropped results rather than errors.
    pub fn map(&self, edges: &[TransferEdge], user_address: &str) -> Vec<UiTransfer> {
        if user_address.is_empty() {
            return Vec::new();
        }
        edges
            .iter()
            .filter_map(|edge| edge.node.as_ref())
            .map(|node| self.map_one(node, user_address))
            .collect()
    }

    fn map_one(&self, transfer: &Transfer, user_address: &str) -> UiTransfer {
        let kind = resolve_direction(transfer, user_address);
        let is_nft = transfer.transfer_type.is_nft();
        let token = self.resolve_token(&transfer.token, is_nft);
        let amount = amount_magnitude(&transfer.amount);
        let amount_raw = safe_amount(&amount);

        UiTransfer {
            id: transfer.id.clone(),
            from: transfer.from.id.clone(),
            to: transfer.to.id.clone(),
            kind,
            amount,
            amount_raw,
            is_nft,
            token,
            timestamp: transfer.timestamp.clone(),
            success: transfer.success,
            extrinsic_hash: transfer.extrinsic_hash.clone().unwrap_or_default(),
            fee_amount: extract_fee(transfer.signed_data.as_ref()),
            method: None,
            swap_info: None,
            block_height: transfer.block_height,
            extrinsic_index: transfer.extrinsic_index,
            event_index: transfer.event_index,
            extrinsic_id: transfer.extrinsic_id.clone(),
        }
    }

    /// Resolution order: NFT short-circuit, exact "REEF" name, cache,
    /// embedded metadata blob, name heuristic, default decimals. Only
    /// blob parses are cached.
    fn resolve_token(&self, token: &TransferToken, is_nft: bool) -> TokenMeta {
        if is_nft {
            return TokenMeta {
                id: token.id.clone(),
                name: "NFT".to_string(),
                decimals: 0,
            };
        }
        if token.name == "REEF" {
            return TokenMeta {
                id: token.id.clone(),
                name: "REEF".to_string(),
                decimals: REEF_DECIMALS,
            };
        }
        if let Some(cached) = self.cache.get(&token.id) {
            return cached;
        }
        if let Some(parsed) = parse_contract_data(token) {
            self.cache.insert(parsed.clone());
            return parsed;
        }
        if let Some(decimals) = heuristic_decimals(&token.name) {
            return TokenMeta {
                id: token.id.clone(),
                name: token.name.clone(),
                decimals,
            };
        }
        TokenMeta {
            id: token.id.clone(),
            name: token.name.clone(),
            decimals: DEFAULT_DECIMALS,
        }
    }
}

fn resolve_direction(transfer: &Transfer, user_address: &str) -> UiTransferKind {
    let (from_matches, to_matches) = if user_address.starts_with("0x") {
        let from_evm = transfer
            .from_evm_address
            .as_deref()
            .or(transfer.from.evm_address.as_deref())
            .unwrap_or("");
        let to_evm = transfer
            .to_evm_address
            .as_deref()
            .or(transfer.to.evm_address.as_deref())
            .unwrap_or("");
        if from_evm.is_empty() && to_evm.is_empty() {
            (transfer.from.id == user_address, transfer.to.id == user_address)
        } else {
            (evm_addr_eq(from_evm, user_address), evm_addr_eq(to_evm, user_address))
        }
    } else {
        (transfer.from.id == user_address, transfer.to.id == user_address)
    };

    // Self-transfers count as received.
    if to_matches {
        UiTransferKind::Incoming
    } else if from_matches {
        UiTransferKind::Outgoing
    } else {
        UiTransferKind::Incoming
    }
}

/// Decode the contract metadata blob. Some backends deliver it as a JSON
/// object, others as a string containing JSON. A parse only counts when
/// it yields concrete decimals.
fn parse_contract_data(token: &TransferToken) -> Option<TokenMeta> {
    let raw = token.contract_data.as_ref()?;
    let obj: Value = match raw {
        Value::String(s) => serde_json::from_str(s).ok()?,
        other => other.clone(),
    };
    let decimals = obj.get("decimals").and_then(Value::as_u64)? as u32;
    let name = obj
        .get("symbol")
        .or_else(|| obj.get("name"))
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| token.name.clone());
    Some(TokenMeta {
        id: token.id.clone(),
        name,
        decimals,
    })
}

/// Decimals for a short list of well-known symbols; never cached.
fn heuristic_decimals(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    match lower.as_str() {
        "usdc" | "usdc.e" | "usd coin" => Some(6),
        "mrd" => Some(18),
        "reef" => Some(REEF_DECIMALS),
        _ => None,
    }
}

/// Partial fee from the signed-data blob, "0" when absent. The fee object
/// sits at `fee.partialFee` on one backend and one level deeper on the
/// other.
fn extract_fee(signed_data: Option<&Value>) -> String {
    let Some(sd) = signed_data else {
        return "0".to_string();
    };
    let fee = sd
        .pointer("/fee/partialFee")
        .or_else(|| sd.pointer("/signedData/fee/partialFee"));
    match fee {
        Some(Value::String(s)) if !s.is_empty() => {
            // Hex-encoded fees show up on older blocks.
            if let Some(hex) = s.strip_prefix("0x") {
                u128::from_str_radix(hex, 16)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|_| "0".to_string())
            } else {
                s.clone()
            }
        }
        Some(Value::Number(n)) => n.to_string(),
        _ => "0".to_string(),
    }
}
