/// Canonical data model for the transaction feed pipeline.
///
/// The wire types tolerate both backend dialects (the explorer squid and
/// the legacy REST shape) through serde aliases, so everything past the
/// transport boundary works with one shape.
use serde::{ Deserialize, Serialize };
use serde_json::Value;

use crate::utils::safe_amount;

// =============================================================================
// RAW TRANSFER (wire input)
// =============================================================================

/// Account reference as returned by the explorer API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRef {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "evmAddress")]
    pub evm_address: Option<String>,
}

/// Token attached to a raw transfer. `contract_data` is an opaque metadata
/// blob (stringified JSON on some backends, inline JSON on others).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferToken {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "contractData")]
    pub contract_data: Option<Value>,
}

/// Ledger transfer event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferType {
    Native,
    #[serde(rename = "ERC20")]
    Erc20,
    #[serde(rename = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    Erc1155,
}

impl Default for TransferType {
    fn default() -> Self {
        TransferType::Native
    }
}

impl TransferType {
    pub fn is_nft(&self) -> bool {
        matches!(self, TransferType::Erc721 | TransferType::Erc1155)
    }
}

/// Immutable ledger transfer event as delivered by the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Transfer {
    pub id: String,
    /// Unsigned big integer as a decimal string.
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "type")]
    pub transfer_type: TransferType,
    #[serde(default)]
    pub from: AccountRef,
    #[serde(default)]
    pub to: AccountRef,
    /// EVM mirrors of from/to; present on the squid dialect only.
    #[serde(default, alias = "fromEvmAddress")]
    pub from_evm_address: Option<String>,
    #[serde(default, alias = "toEvmAddress")]
    pub to_evm_address: Option<String>,
    #[serde(default, alias = "extrinsicHash")]
    pub extrinsic_hash: Option<String>,
    #[serde(default, alias = "extrinsicId")]
    pub extrinsic_id: Option<String>,
    #[serde(default, alias = "extrinsicIndex")]
    pub extrinsic_index: Option<u32>,
    #[serde(default, alias = "eventIndex")]
    pub event_index: Option<u32>,
    #[serde(default, alias = "blockHeight")]
    pub block_height: Option<u64>,
    /// JSON scalar carrying fee details; nesting varies between backends.
    #[serde(default, alias = "signedData")]
    pub signed_data: Option<Value>,
    /// Set on legs that belong to a reefswap extrinsic.
    #[serde(default, alias = "reefswapAction")]
    pub reefswap_action: Option<String>,
    #[serde(default)]
    pub token: TransferToken,
}

/// One edge of a cursor-paginated transfers connection. A missing node is
/// tolerated and dropped by the mapper.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransferEdge {
    #[serde(default)]
    pub node: Option<Transfer>,
}

/// Relay-style page info. Both fields are optional so a narrower response
/// can be detected and merged without clobbering known pagination state.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageInfo {
    #[serde(default, alias = "hasNextPage")]
    pub has_next_page: Option<bool>,
    #[serde(default, alias = "endCursor")]
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Usable for merging when it carries either a concrete has-next flag
    /// or a cursor.
    pub fn is_usable(&self) -> bool {
        self.has_next_page.is_some() || self.end_cursor.is_some()
    }

    /// Closed state: no further pages, no cursor.
    pub fn closed() -> Self {
        Self {
            has_next_page: Some(false),
            end_cursor: None,
        }
    }

    pub fn has_next(&self) -> bool {
        self.has_next_page.unwrap_or(false)
    }
}

/// Cursor-paginated transfers connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TransfersConnection {
    #[serde(default)]
    pub edges: Vec<TransferEdge>,
    #[serde(default, alias = "pageInfo")]
    pub page_info: Option<PageInfo>,
    #[serde(default, alias = "totalCount")]
    pub total_count: Option<u64>,
}

impl TransfersConnection {
    /// Non-null nodes in edge order.
    pub fn nodes(&self) -> impl Iterator<Item = &Transfer> {
        self.edges.iter().filter_map(|e| e.node.as_ref())
    }
}

// =============================================================================
// POOL EVENTS (swap legs)
// =============================================================================

/// Pool token descriptor from the swap squid.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolToken {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub decimals: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pool {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub token1: PoolToken,
    #[serde(default)]
    pub token2: PoolToken,
}

/// One leg of a pool event. Legs of the same swap share a base id that
/// differs only in the trailing ordinal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PoolEventNode {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "blockHeight")]
    pub block_height: u64,
    #[serde(default, alias = "indexInBlock")]
    pub index_in_block: u32,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default, rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub pool: Pool,
    #[serde(default, alias = "senderAddress")]
    pub sender_address: String,
    #[serde(default, alias = "toAddress")]
    pub to_address: Option<String>,
    /// Output amounts per pool token (decimal strings, may carry a sign).
    #[serde(default)]
    pub amount1: Option<String>,
    #[serde(default)]
    pub amount2: Option<String>,
    /// Explicit input amounts; absent on older data shapes.
    #[serde(default, alias = "amountIn1")]
    pub amount_in1: Option<String>,
    #[serde(default, alias = "amountIn2")]
    pub amount_in2: Option<String>,
}

// =============================================================================
// UI ROW (derived output)
// =============================================================================

/// Direction of a row relative to the queried account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiTransferKind {
    Incoming,
    Outgoing,
    Swap,
}

/// Resolved token metadata attached to UI rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenMeta {
    pub id: String,
    pub name: String,
    pub decimals: u32,
}

/// One side of an aggregated swap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapLeg {
    /// Decimal string, absolute value.
    pub amount: String,
    /// Numeric shadow of `amount` for comparisons; saturates at u128::MAX.
    pub amount_raw: u128,
    pub token: TokenMeta,
}

impl SwapLeg {
    pub fn new(amount: String, token: TokenMeta) -> Self {
        let amount_raw = safe_amount(&amount);
        Self { amount, amount_raw, token }
    }
}

/// Sold/bought detail attached to SWAP rows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapInfo {
    pub sold: SwapLeg,
    pub bought: SwapLeg,
}

/// The row presented to consumers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UiTransfer {
    /// Unique within a result set; aggregated swap rows use `<hash>:swap`.
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: UiTransferKind,
    /// Decimal string; for swap rows this is the bought amount.
    pub amount: String,
    /// Numeric shadow of `amount`.
    pub amount_raw: u128,
    pub is_nft: bool,
    pub token: TokenMeta,
    pub timestamp: String,
    pub success: bool,
    /// Empty string when the event had no extrinsic hash.
    pub extrinsic_hash: String,
    /// Partial fee in the native token, "0" when unavailable.
    pub fee_amount: String,
    /// Extrinsic method; `Some("swap")` on aggregated rows.
    pub method: Option<String>,
    pub swap_info: Option<SwapInfo>,
    pub block_height: Option<u64>,
    pub extrinsic_index: Option<u32>,
    pub event_index: Option<u32>,
    pub extrinsic_id: Option<String>,
}

impl UiTransfer {
    pub fn is_swap(&self) -> bool {
        self.kind == UiTransferKind::Swap || self.method.as_deref() == Some("swap")
    }
}

/// Snapshot of the feed exposed to consumers after a pipeline pass.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub transfers: Vec<UiTransfer>,
    pub loading: bool,
    pub error: Option<crate::errors::FeedError>,
    pub has_more: bool,
    pub total_count: Option<u64>,
}

/// Per-direction row counts over the filtered set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadedCounts {
    pub incoming: usize,
    pub outgoing: usize,
    pub swap: usize,
}

/// Which known token groups appear anywhere in the loaded rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AvailableTokens {
    pub reef: bool,
    pub usdc: bool,
    pub mrd: bool,
}
