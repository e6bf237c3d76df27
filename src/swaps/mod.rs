/// Swap detection and aggregation over loaded feed rows.
///
/// Two sources produce SWAP rows: pool events from the swap squid
/// (`aggregate`) and plain transfer legs collapsed by extrinsic hash
/// (`collapse_transfer_swaps`).

pub mod aggregate;
pub mod partner;

pub use aggregate::aggregate_pool_events;
pub use partner::PartnerLegStore;

use crate::types::{ SwapInfo, SwapLeg, UiTransfer, UiTransferKind };
use crate::utils::swap_row_id;
use std::collections::{ HashMap, HashSet };

/// Collapse fungible incoming+outgoing legs that share an extrinsic hash
/// into one SWAP row. Groups that do not look like a swap pass through
/// untouched.
pub fn collapse_transfer_swaps(transfers: Vec<UiTransfer>) -> Vec<UiTransfer> {
    let mut by_hash: HashMap<String, Vec<UiTransfer>> = HashMap::new();
    let mut hash_order: Vec<String> = Vec::new();
    for t in transfers {
        let key = if t.extrinsic_hash.is_empty() { t.id.clone() } else { t.extrinsic_hash.clone() };
        if !by_hash.contains_key(&key) {
            hash_order.push(key.clone());
        }
        by_hash.entry(key).or_default().push(t);
    }

    let mut out = Vec::new();
    for hash in hash_order {
        let group = by_hash.remove(&hash).unwrap_or_default();

        let max_in = pick_max(&group, UiTransferKind::Incoming).cloned();
        let max_out = pick_max(&group, UiTransferKind::Outgoing).cloned();
        let (Some(max_in), Some(max_out)) = (max_in, max_out) else {
            out.extend(group);
            continue;
        };

        // Same dominant token on both sides is a round-trip, not a swap.
        if max_in.token.id == max_out.token.id {
            out.extend(group);
            continue;
        }

        let timestamp = if max_in.timestamp.is_empty() {
            max_out.timestamp.clone()
        } else {
            max_in.timestamp.clone()
        };
        let success = group.iter().all(|g| g.success);

        out.push(UiTransfer {
            id: swap_row_id(&hash),
            from: max_out.from.clone(),
            to: max_in.to.clone(),
            kind: UiTransferKind::Swap,
            amount: max_in.amount.clone(),
            amount_raw: max_in.amount_raw,
            is_nft: false,
            token: max_in.token.clone(),
            timestamp,
            success,
            extrinsic_hash: hash,
            fee_amount: max_in.fee_amount.clone(),
            method: Some("swap".to_string()),
            swap_info: Some(SwapInfo {
                sold: SwapLeg::new(max_out.amount.clone(), max_out.token.clone()),
                bought: SwapLeg::new(max_in.amount.clone(), max_in.token.clone()),
            }),
            block_height: max_in.block_height.or(max_out.block_height),
            extrinsic_index: max_in.extrinsic_index.or(max_out.extrinsic_index),
            event_index: max_in.event_index.or(max_out.event_index),
            extrinsic_id: max_in.extrinsic_id.clone().or_else(|| max_out.extrinsic_id.clone()),
        });
    }
    out
}

/// Largest fungible leg of the given direction, by raw amount.
fn pick_max(group: &[UiTransfer], kind: UiTransferKind) -> Option<&UiTransfer> {
    group
        .iter()
        .filter(|g| !g.is_nft && g.kind == kind)
        .max_by(|a, b| a.amount_raw.cmp(&b.amount_raw).then_with(|| b.id.cmp(&a.id)))
}

/// Raw transfer facts needed for partner-leg gap detection.
pub struct PartnerCandidate<'a> {
    pub extrinsic_hash: Option<&'a str>,
    pub has_swap_flag: bool,
    pub is_nft: bool,
    pub kind: UiTransferKind,
}

/// Extrinsic hashes whose swap partner leg is plausibly missing from the
/// loaded page. In strict mode a hash also qualifies when its group lacks
/// either direction among fungible legs.
pub fn identify_missing_partner_hashes(
    candidates: &[PartnerCandidate<'_>],
    already_loaded: &HashSet<String>,
    strict: bool,
) -> Vec<String> {
    let mut by_hash: HashMap<&str, Vec<&PartnerCandidate<'_>>> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for c in candidates {
        let Some(hash) = c.extrinsic_hash else {
            continue;
        };
        if hash.is_empty() {
            continue;
        }
        if !by_hash.contains_key(hash) {
            order.push(hash);
        }
        by_hash.entry(hash).or_default().push(c);
    }

    let mut missing = Vec::new();
    for hash in order {
        if already_loaded.contains(hash) {
            continue;
        }
        let group = &by_hash[hash];
        let has_flag = group.iter().any(|g| g.has_swap_flag);
        if strict {
            let has_in = group
                .iter()
                .any(|g| !g.is_nft && g.kind == UiTransferKind::Incoming);
            let has_out = group
                .iter()
                .any(|g| !g.is_nft && g.kind == UiTransferKind::Outgoing);
            if has_flag || !(has_in && has_out) {
                missing.push(hash.to_string());
            }
        } else if has_flag {
            missing.push(hash.to_string());
        }
    }
    missing
}
