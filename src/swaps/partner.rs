/// Best-effort backfill of missing swap partner legs.
///
/// Swap extrinsics record two transfer legs, but a filtered page can load
/// only one. This store fetches the missing twins in capped batches and
/// keeps them keyed by extrinsic hash. Failures degrade enrichment only
/// and are never surfaced as pipeline errors.

use crate::config::SwapsConfig;
use crate::transport::{ FeedTransport, fetch_transfers_by_hashes };
use crate::types::Transfer;
use std::collections::{ HashMap, HashSet };

#[derive(Default)]
pub struct PartnerLegStore {
    by_hash: HashMap<String, Vec<Transfer>>,
}

impl PartnerLegStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved_hashes(&self) -> HashSet<String> {
        self.by_hash.keys().cloned().collect()
    }

    pub fn legs_for(&self, hash: &str) -> Option<&[Transfer]> {
        self.by_hash.get(hash).map(Vec::as_slice)
    }

    /// All stored partner legs, for merging into the loaded row set.
    pub fn all_legs(&self) -> impl Iterator<Item = &Transfer> {
        self.by_hash.values().flatten()
    }

    pub fn clear(&mut self) {
        self.by_hash.clear();
    }

    /// Run one backfill round over `missing` hashes. At most
    /// `partner_batch_hashes` unresolved hashes are queried, with the row
    /// limit capped at `partner_row_cap`. Hashes already resolved are
    /// never overwritten.
    pub async fn backfill(
        &mut self,
        transport: &dyn FeedTransport,
        missing: &[String],
        config: &SwapsConfig,
    ) {
        let batch: Vec<String> = missing
            .iter()
            .filter(|h| !self.by_hash.contains_key(*h))
            .take(config.partner_batch_hashes)
            .cloned()
            .collect();
        if batch.is_empty() {
            return;
        }

        let limit = (batch.len() * config.partner_rows_per_hash).min(config.partner_row_cap);
        let rows = match fetch_transfers_by_hashes(transport, &batch, limit).await {
            Ok(rows) => rows,
            Err(err) => {
                log::warn!("[SWAPS] Partner leg backfill failed ({} hashes): {}", batch.len(), err);
                return;
            }
        };

        let mut fetched: HashMap<String, Vec<Transfer>> = HashMap::new();
        for row in rows {
            let Some(hash) = row.extrinsic_hash.clone() else {
                continue;
            };
            fetched.entry(hash).or_default().push(row);
        }

        for (hash, legs) in fetched {
            self.by_hash.entry(hash).or_insert(legs);
        }
        // Remember queried hashes that returned nothing so they are not
        // re-queried every round.
        for hash in batch {
            self.by_hash.entry(hash).or_default();
        }
    }
}
