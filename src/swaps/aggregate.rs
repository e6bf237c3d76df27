/// Aggregation of pool-event legs into one SWAP row per logical swap.
///
/// Legs of the same swap share an id base differing only in the trailing
/// ordinal, so grouping strips that ordinal; legs without a recognizable
/// id fall back to (blockHeight, indexInBlock). Repeated partial legs may
/// re-report the same logical amount, so per-direction running maxima are
/// kept, never sums.

use crate::types::{ PoolEventNode, SwapInfo, SwapLeg, TokenMeta, UiTransfer, UiTransferKind };
use crate::utils::{ safe_amount, swap_row_id };
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static LEG_ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+)-(\d+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSide {
    Token1,
    Token2,
}

struct SwapGroup {
    key: String,
    from: String,
    to: String,
    token1: TokenMeta,
    token2: TokenMeta,
    block_height: u64,
    index_in_block: u32,
    timestamp: Option<String>,
    event_index: Option<u32>,
    has_inputs: bool,
    sold_side: Option<TokenSide>,
    bought_side: Option<TokenSide>,
    sold_max: u128,
    bought_max: u128,
    out1_max: u128,
    out2_max: u128,
}

/// Aggregate a batch of pool-event legs. Grouping and the max accumulators
/// are order-independent: any permutation of `legs` yields the same rows.
pub fn aggregate_pool_events(legs: &[PoolEventNode]) -> Vec<UiTransfer> {
    let mut groups: HashMap<String, SwapGroup> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for leg in legs {
        if leg.pool.token1.id.is_empty() || leg.pool.token2.id.is_empty() {
            log::debug!("[SWAPS] Dropping pool event {} without pool tokens", leg.id);
            continue;
        }

        let (key, ordinal) = group_key(leg);
        if !groups.contains_key(&key) {
            order.push(key.clone());
            groups.insert(key.clone(), SwapGroup {
                key: key.clone(),
                from: leg.sender_address.clone(),
                to: leg.to_address.clone().unwrap_or_default(),
                token1: pool_token_meta(&leg.pool.token1),
                token2: pool_token_meta(&leg.pool.token2),
                block_height: leg.block_height,
                index_in_block: leg.index_in_block,
                timestamp: leg.timestamp.clone(),
                event_index: None,
                has_inputs: false,
                sold_side: None,
                bought_side: None,
                sold_max: 0,
                bought_max: 0,
                out1_max: 0,
                out2_max: 0,
            });
        }
        let group = groups.get_mut(&key).unwrap();

        if let Some(ev) = ordinal {
            group.event_index = Some(group.event_index.map_or(ev, |cur| cur.max(ev)));
        }
        if group.from.is_empty() && !leg.sender_address.is_empty() {
            group.from = leg.sender_address.clone();
        }
        if group.to.is_empty() {
            if let Some(to) = &leg.to_address {
                group.to = to.clone();
            }
        }
        if group.timestamp.is_none() {
            group.timestamp = leg.timestamp.clone();
        }

        accumulate(group, leg);
    }

    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .map(finish_group)
        .collect()
}

fn group_key(leg: &PoolEventNode) -> (String, Option<u32>) {
    if let Some(caps) = LEG_ORDINAL.captures(&leg.id) {
        let base = caps.get(1).map(|m| m.as_str().to_string());
        let ordinal = caps.get(2).and_then(|m| m.as_str().parse::<u32>().ok());
        if let Some(base) = base {
            return (base, ordinal);
        }
    }
    (format!("{}-{}", leg.block_height, leg.index_in_block), None)
}

fn pool_token_meta(token: &crate::types::PoolToken) -> TokenMeta {
    TokenMeta {
        id: token.id.clone(),
        name: token.name.clone(),
        decimals: token.decimals,
    }
}

/// amountIn1/amountIn2 are inputs per pool token; amount1/amount2 are
/// outputs. A positive input to one token fixes the sold side; the paired
/// output feeds the bought maximum.
fn accumulate(group: &mut SwapGroup, leg: &PoolEventNode) {
    let in1 = opt_amount(&leg.amount_in1);
    let in2 = opt_amount(&leg.amount_in2);
    let out1 = opt_amount(&leg.amount1);
    let out2 = opt_amount(&leg.amount2);

    if in1 > 0 || in2 > 0 {
        group.has_inputs = true;
        if in1 > 0 {
            group.sold_side = Some(TokenSide::Token1);
            group.bought_side = Some(TokenSide::Token2);
            group.sold_max = group.sold_max.max(in1);
            group.bought_max = group.bought_max.max(out2);
        } else {
            group.sold_side = Some(TokenSide::Token2);
            group.bought_side = Some(TokenSide::Token1);
            group.sold_max = group.sold_max.max(in2);
            group.bought_max = group.bought_max.max(out1);
        }
        group.out1_max = group.out1_max.max(out1);
        group.out2_max = group.out2_max.max(out2);
    } else {
        // Older shape: outputs only. The larger output marks the bought
        // side; duplicate partial legs cannot inflate it past the max.
        if leg.amount1.is_some() {
            if out1 > group.bought_max {
                group.bought_side = Some(TokenSide::Token1);
                group.bought_max = out1;
            }
            group.out1_max = group.out1_max.max(out1);
        }
        if leg.amount2.is_some() {
            if out2 > group.bought_max {
                group.bought_side = Some(TokenSide::Token2);
                group.bought_max = out2;
            }
            group.out2_max = group.out2_max.max(out2);
        }
    }
}

fn opt_amount(value: &Option<String>) -> u128 {
    value.as_deref().map(safe_amount).unwrap_or(0)
}

fn finish_group(group: SwapGroup) -> UiTransfer {
    let sold_side = group
        .sold_side
        .unwrap_or(match group.bought_side {
            Some(TokenSide::Token1) => TokenSide::Token2,
            _ => TokenSide::Token1,
        });
    let bought_side = group.bought_side.unwrap_or(match sold_side {
        TokenSide::Token1 => TokenSide::Token2,
        TokenSide::Token2 => TokenSide::Token1,
    });

    let sold_amount = if group.has_inputs {
        group.sold_max
    } else {
        // Without inputs the sold amount is the other token's output.
        match sold_side {
            TokenSide::Token1 => group.out1_max,
            TokenSide::Token2 => group.out2_max,
        }
    };
    let bought_amount = group.bought_max;

    let sold_token = side_token(&group, sold_side);
    let bought_token = side_token(&group, bought_side);

    let extrinsic_id = Some(format!("{}-{}", group.block_height, group.index_in_block));
    let bought_str = bought_amount.to_string();

    UiTransfer {
        id: swap_row_id(&group.key),
        from: group.from.clone(),
        to: group.to.clone(),
        kind: UiTransferKind::Swap,
        amount: bought_str.clone(),
        amount_raw: bought_amount,
        is_nft: false,
        token: bought_token.clone(),
        timestamp: group.timestamp.clone().unwrap_or_default(),
        success: true,
        extrinsic_hash: String::new(),
        fee_amount: "0".to_string(),
        method: Some("swap".to_string()),
        swap_info: Some(SwapInfo {
            sold: SwapLeg::new(sold_amount.to_string(), sold_token),
            bought: SwapLeg::new(bought_str, bought_token),
        }),
        block_height: Some(group.block_height),
        extrinsic_index: Some(group.index_in_block),
        event_index: group.event_index,
        extrinsic_id,
    }
}

fn side_token(group: &SwapGroup, side: TokenSide) -> TokenMeta {
    match side {
        TokenSide::Token1 => group.token1.clone(),
        TokenSide::Token2 => group.token2.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ Pool, PoolToken };

    fn pool() -> Pool {
        Pool {
            id: "pool-1".to_string(),
            token1: PoolToken {
                id: "0xaaa".to_string(),
                name: "REEF".to_string(),
                decimals: 18,
            },
            token2: PoolToken {
                id: "0xbbb".to_string(),
                name: "MRD".to_string(),
                decimals: 18,
            },
        }
    }

    fn node(id: &str) -> PoolEventNode {
        PoolEventNode {
            id: id.to_string(),
            block_height: 100,
            index_in_block: 4,
            timestamp: Some("2024-05-01T10:00:00Z".to_string()),
            event_type: "Swap".to_string(),
            pool: pool(),
            sender_address: "5Sender".to_string(),
            to_address: Some("5Receiver".to_string()),
            amount1: None,
            amount2: None,
            amount_in1: None,
            amount_in2: None,
        }
    }

    #[test]
    fn duplicate_partial_legs_take_max_not_sum() {
        let mut leg_a = node("100-1");
        leg_a.amount_in1 = Some("1000".to_string());
        leg_a.amount2 = Some("900".to_string());
        let mut leg_b = node("100-2");
        leg_b.amount1 = Some("900".to_string());

        let rows = aggregate_pool_events(&[leg_a, leg_b]);
        assert_eq!(rows.len(), 1);
        let info = rows[0].swap_info.as_ref().unwrap();
        assert_eq!(info.sold.amount, "1000");
        assert_eq!(info.sold.token.id, "0xaaa");
        assert_eq!(info.bought.amount, "900");
        assert_eq!(info.bought.token.id, "0xbbb");
    }

    #[test]
    fn aggregation_is_order_independent() {
        let mut leg_a = node("55-1");
        leg_a.amount_in2 = Some("777".to_string());
        leg_a.amount1 = Some("333".to_string());
        let mut leg_b = node("55-2");
        leg_b.amount1 = Some("333".to_string());
        let mut leg_c = node("55-3");
        leg_c.amount_in2 = Some("777".to_string());

        let forward = aggregate_pool_events(&[leg_a.clone(), leg_b.clone(), leg_c.clone()]);
        let reversed = aggregate_pool_events(&[leg_c, leg_b, leg_a]);

        assert_eq!(forward.len(), 1);
        let f = forward[0].swap_info.as_ref().unwrap();
        let r = reversed[0].swap_info.as_ref().unwrap();
        assert_eq!(f.sold.amount, r.sold.amount);
        assert_eq!(f.bought.amount, r.bought.amount);
        assert_eq!(f.sold.token, r.sold.token);
        assert_eq!(f.bought.token, r.bought.token);
        assert_eq!(f.sold.amount, "777");
        assert_eq!(f.bought.amount, "333");
    }

    #[test]
    fn unsuffixed_ids_group_by_block_position() {
        let mut leg_a = node("opaque");
        leg_a.amount_in1 = Some("10".to_string());
        let mut leg_b = node("opaque");
        leg_b.amount2 = Some("20".to_string());

        let rows = aggregate_pool_events(&[leg_a, leg_b]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].block_height, Some(100));
        assert_eq!(rows[0].extrinsic_id.as_deref(), Some("100-4"));
    }

    #[test]
    fn legacy_output_only_shape_infers_bought_side() {
        let mut leg = node("77-1");
        leg.amount2 = Some("-500".to_string());

        let rows = aggregate_pool_events(&[leg]);
        let info = rows[0].swap_info.as_ref().unwrap();
        assert_eq!(info.bought.token.id, "0xbbb");
        assert_eq!(info.bought.amount, "500");
        assert_eq!(info.sold.token.id, "0xaaa");
    }

    #[test]
    fn event_index_is_max_trailing_ordinal() {
        let mut leg_a = node("9-2");
        leg_a.amount_in1 = Some("1".to_string());
        let leg_b = node("9-5");

        let rows = aggregate_pool_events(&[leg_a, leg_b]);
        assert_eq!(rows[0].event_index, Some(5));
    }

    #[test]
    fn legs_without_pool_tokens_are_dropped() {
        let mut leg = node("1-1");
        leg.pool.token1.id = String::new();
        assert!(aggregate_pool_events(&[leg]).is_empty());
    }
}
