/// Ordering and uniqueness passes applied after merge and mapping.

use crate::types::UiTransfer;
use crate::utils::to_epoch_ms;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Sorts by raw amount ascending, ties broken by id ascending.
pub fn sort_by_amount(rows: &mut [UiTransfer]) {
    rows.sort_by(|a, b| {
        match a.amount_raw.cmp(&b.amount_raw) {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    });
}

/// Sorts newest first, ties broken by id descending so rows from the
/// same block keep their ledger order reversed consistently.
pub fn sort_by_timestamp(rows: &mut [UiTransfer]) {
    rows.sort_by(|a, b| {
        let ta = to_epoch_ms(&a.timestamp);
        let tb = to_epoch_ms(&b.timestamp);
        match tb.cmp(&ta) {
            Ordering::Equal => b.id.cmp(&a.id),
            other => other,
        }
    });
}

/// Drops later duplicates by id, keeping first occurrence order.
pub fn ensure_unique(rows: Vec<UiTransfer>) -> Vec<UiTransfer> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if seen.insert(row.id.clone()) {
            out.push(row);
        } else {
            log::debug!("[PIPELINE] Dropping duplicate row id {}", row.id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ TokenMeta, UiTransferKind };

    fn row(id: &str, amount: u128, ts: &str) -> UiTransfer {
        UiTransfer {
            id: id.to_string(),
            from: "a".into(),
            to: "b".into(),
            kind: UiTransferKind::Incoming,
            amount: amount.to_string(),
            amount_raw: amount,
            is_nft: false,
            token: TokenMeta { id: "reef-token".into(), name: "REEF".into(), decimals: 18 },
            timestamp: ts.to_string(),
            success: true,
            extrinsic_hash: "0xabc".into(),
            fee_amount: "0".into(),
            method: None,
            swap_info: None,
            block_height: None,
            extrinsic_index: None,
            event_index: None,
            extrinsic_id: None,
        }
    }

    #[test]
    fn amount_sort_is_ascending_with_id_tiebreak() {
        let mut rows = vec![
            row("b", 5, "2023-01-01T00:00:00Z"),
            row("a", 5, "2023-01-01T00:00:00Z"),
            row("c", 1, "2023-01-01T00:00:00Z"),
        ];
        sort_by_amount(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["c", "a", "b"]);
    }

    #[test]
    fn timestamp_sort_is_newest_first_with_id_desc_tiebreak() {
        let mut rows = vec![
            row("0001-1", 1, "2023-01-01T00:00:00Z"),
            row("0002-1", 1, "2023-01-02T00:00:00Z"),
            row("0001-2", 1, "2023-01-01T00:00:00Z"),
        ];
        sort_by_timestamp(&mut rows);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["0002-1", "0001-2", "0001-1"]);
    }

    #[test]
    fn duplicates_keep_the_first_occurrence() {
        let rows = vec![row("a", 1, "t"), row("b", 2, "t"), row("a", 3, "t")];
        let out = ensure_unique(rows);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].amount, "1");
    }
}
