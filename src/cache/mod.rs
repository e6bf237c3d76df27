/// In-memory bounded cache for fetched feed pages.
///
/// Keyed by (address, page, variant). Eviction drops the least-recently
/// touched entry; both reads and writes refresh recency. Entries are
/// validated on write so a malformed page can never poison later reads.

use crate::types::{ PageInfo, TransferEdge };
use std::collections::{ HashMap, VecDeque };
use std::sync::{ Arc, RwLock };

/// Distinguishes raw api-page slices from consumer-facing page sets that
/// were built under a token filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PageVariant {
    Plain,
    Filtered(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub address: String,
    pub page: usize,
    pub variant: PageVariant,
}

impl PageKey {
    pub fn plain(address: &str, page: usize) -> Self {
        Self {
            address: address.to_string(),
            page,
            variant: PageVariant::Plain,
        }
    }

    pub fn filtered(address: &str, page: usize, filter: &str) -> Self {
        Self {
            address: address.to_string(),
            page,
            variant: PageVariant::Filtered(filter.to_lowercase()),
        }
    }
}

/// One cached page of raw edges plus the pagination state observed when
/// it was fetched. Edges are cached unmapped so a cache hit can be fed
/// straight back through the connection merge. `total_count` is signed so
/// corrupt negative counts can be rejected instead of wrapping.
#[derive(Debug, Clone)]
pub struct CachedPage {
    pub edges: Vec<TransferEdge>,
    pub page_info: PageInfo,
    /// Resolved native address the page was fetched for.
    pub native_address: String,
    pub total_count: i64,
}

impl CachedPage {
    /// A page is storable when it names its owner, its count is
    /// non-negative and every edge carries a node with an id.
    fn is_valid(&self) -> bool {
        !self.native_address.is_empty()
            && self.total_count >= 0
            && self.edges.iter().all(|e| {
                e.node.as_ref().is_some_and(|n| !n.id.is_empty())
            })
    }
}

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejected_writes: u64,
    pub inserts: u64,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct PageCache {
    capacity: usize,
    data: Arc<RwLock<HashMap<PageKey, CachedPage>>>,
    access_order: Arc<RwLock<VecDeque<PageKey>>>,
    metrics: Arc<RwLock<CacheMetrics>>,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            data: Arc::new(RwLock::new(HashMap::new())),
            access_order: Arc::new(RwLock::new(VecDeque::new())),
            metrics: Arc::new(RwLock::new(CacheMetrics::default())),
        }
    }

    pub fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let data = self.data.read().unwrap();
        let hit = data.get(key).cloned();

        if hit.is_some() {
            let mut order = self.access_order.write().unwrap();
            order.retain(|k| k != key);
            order.push_back(key.clone());
        }

        let mut metrics = self.metrics.write().unwrap();
        if hit.is_some() {
            metrics.hits += 1;
        } else {
            metrics.misses += 1;
        }
        hit
    }

    pub fn has(&self, key: &PageKey) -> bool {
        self.data.read().unwrap().contains_key(key)
    }

    /// Insert a page, evicting the least-recently touched entries past
    /// capacity. Invalid pages are dropped and counted, never stored.
    pub fn insert(&self, key: PageKey, page: CachedPage) {
        if !page.is_valid() {
            log::warn!(
                "[CACHE] Rejected invalid page for {} p{} (count={})",
                key.address,
                key.page,
                page.total_count
            );
            let mut metrics = self.metrics.write().unwrap();
            metrics.rejected_writes += 1;
            return;
        }

        let mut data = self.data.write().unwrap();
        let mut order = self.access_order.write().unwrap();

        order.retain(|k| k != &key);
        data.insert(key.clone(), page);
        order.push_back(key);

        let mut metrics = self.metrics.write().unwrap();
        metrics.inserts += 1;

        while data.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                data.remove(&oldest);
                metrics.evictions += 1;
            } else {
                break;
            }
        }
    }

    /// Drop every cached page belonging to an address, all variants.
    pub fn clear_for_address(&self, address: &str) {
        let mut data = self.data.write().unwrap();
        let mut order = self.access_order.write().unwrap();
        data.retain(|k, _| k.address != address);
        order.retain(|k| k.address != address);
    }

    pub fn clear(&self) {
        self.data.write().unwrap().clear();
        self.access_order.write().unwrap().clear();
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transfer;

    fn edge(id: &str) -> TransferEdge {
        TransferEdge {
            node: Some(Transfer {
                id: id.to_string(),
                ..Transfer::default()
            }),
        }
    }

    fn page(ids: &[&str]) -> CachedPage {
        CachedPage {
            edges: ids.iter().map(|i| edge(i)).collect(),
            page_info: PageInfo::closed(),
            native_address: "native-addr".to_string(),
            total_count: ids.len() as i64,
        }
    }

    #[test]
    fn basic_insert_and_get() {
        let cache = PageCache::new(10);
        let key = PageKey::plain("addr1", 0);
        cache.insert(key.clone(), page(&["t1", "t2"]));

        let got = cache.get(&key).unwrap();
        assert_eq!(got.edges.len(), 2);
        assert!(cache.get(&PageKey::plain("addr1", 1)).is_none());

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
    }

    #[test]
    fn eviction_keeps_exactly_capacity_entries() {
        let cache = PageCache::new(3);
        for p in 0..7 {
            cache.insert(PageKey::plain("a", p), page(&["t"]));
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.metrics().evictions, 4);
        // The least-recently touched keys are gone.
        assert!(!cache.has(&PageKey::plain("a", 3)));
        assert!(cache.has(&PageKey::plain("a", 4)));
        assert!(cache.has(&PageKey::plain("a", 6)));
    }

    #[test]
    fn reads_refresh_recency() {
        let cache = PageCache::new(2);
        cache.insert(PageKey::plain("a", 0), page(&["t1"]));
        cache.insert(PageKey::plain("a", 1), page(&["t2"]));

        // Touching page 0 makes page 1 the eviction candidate.
        assert!(cache.get(&PageKey::plain("a", 0)).is_some());
        cache.insert(PageKey::plain("a", 2), page(&["t3"]));

        assert!(cache.has(&PageKey::plain("a", 0)));
        assert!(!cache.has(&PageKey::plain("a", 1)));
        assert!(cache.has(&PageKey::plain("a", 2)));
    }

    #[test]
    fn reinsert_refreshes_recency() {
        let cache = PageCache::new(2);
        cache.insert(PageKey::plain("a", 0), page(&["t1"]));
        cache.insert(PageKey::plain("a", 1), page(&["t2"]));
        cache.insert(PageKey::plain("a", 0), page(&["t1b"]));
        cache.insert(PageKey::plain("a", 2), page(&["t3"]));

        assert!(!cache.has(&PageKey::plain("a", 1)));
        let refreshed = cache.get(&PageKey::plain("a", 0)).unwrap();
        assert_eq!(refreshed.edges[0].node.as_ref().unwrap().id, "t1b");
    }

    #[test]
    fn invalid_pages_are_rejected() {
        let cache = PageCache::new(10);
        let mut bad = page(&["t1"]);
        bad.total_count = -1;
        cache.insert(PageKey::plain("a", 0), bad);

        let mut anon = page(&["t1"]);
        anon.edges[0].node = None;
        cache.insert(PageKey::plain("a", 1), anon);

        let mut unowned = page(&["t1"]);
        unowned.native_address = String::new();
        cache.insert(PageKey::plain("a", 2), unowned);

        assert!(cache.is_empty());
        assert_eq!(cache.metrics().rejected_writes, 3);
    }

    #[test]
    fn clear_for_address_leaves_other_addresses() {
        let cache = PageCache::new(10);
        cache.insert(PageKey::plain("a", 0), page(&["t1"]));
        cache.insert(PageKey::filtered("a", 0, "REEF"), page(&["t2"]));
        cache.insert(PageKey::plain("b", 0), page(&["t3"]));

        cache.clear_for_address("a");
        assert!(cache.get(&PageKey::plain("a", 0)).is_none());
        assert!(cache.get(&PageKey::filtered("a", 0, "reef")).is_none());
        assert!(cache.get(&PageKey::plain("b", 0)).is_some());
    }
}
