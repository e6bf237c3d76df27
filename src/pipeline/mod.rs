/// Feed orchestration: address resolution, query variables, cache-first
/// fetching, connection merging, mapping, filtering, ordering and swap
/// aggregation, exposed behind `refresh`/`fetch_more`/`fetch_window`.

pub mod filter;
pub mod normalize;
pub mod query;

pub use filter::RowFilter;
pub use query::{ Direction, FeedQuery };

use crate::cache::{ CachedPage, CacheMetrics, PageCache, PageKey };
use crate::config::PipelineConfig;
use crate::connection::merge_connections;
use crate::errors::{ FeedError, FeedResult };
use crate::mapper::{ TokenMetaCache, TransferMapper };
use crate::pagination::{
    ensure_loaded,
    required_count,
    should_use_fast_window,
    CancelToken,
    EnsureOutcome,
    EnsureState,
    FetchProgress,
};
use crate::resolver::{ AddressResolver, SyntacticResolver };
use crate::swaps::{
    aggregate_pool_events,
    collapse_transfer_swaps,
    identify_missing_partner_hashes,
    PartnerCandidate,
    PartnerLegStore,
};
use crate::tokens::{ SessionIdStore, TokenBootstrap, TokenFilter };
use crate::transport::{
    fetch_pool_events,
    fetch_transfers_connection,
    fetch_transfers_window,
    FeedTransport,
};
use crate::types::{
    FeedSnapshot,
    PageInfo,
    PoolEventNode,
    TransferEdge,
    TransfersConnection,
    UiTransfer,
};
use crate::utils::safe_amount;
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{ Duration, Instant };

const TOKEN_META_CAPACITY: usize = 512;

pub struct TransactionPipeline {
    transport: Arc<dyn FeedTransport>,
    config: PipelineConfig,
    resolver: Box<dyn AddressResolver>,
    mapper: TransferMapper,
    page_cache: PageCache,
    partner_legs: PartnerLegStore,
    sessions: SessionIdStore,
    bootstrap: TokenBootstrap,
    ensure: EnsureState,
    cancel: CancelToken,

    query: FeedQuery,
    row_filter: RowFilter,
    /// Original user input, used for direction matching in the mapper.
    user_address: String,
    /// Canonical merged edge set for the current address+filter session.
    connection: Option<TransfersConnection>,
    pages_loaded: usize,
    /// Mapped rows before swap collapsing; used for partner-gap detection.
    leg_rows: Vec<UiTransfer>,
    rows: Vec<UiTransfer>,
    loading: bool,
    last_error: Option<FeedError>,
    fallback_entered: bool,
}

impl TransactionPipeline {
    pub fn new(transport: Arc<dyn FeedTransport>, config: PipelineConfig) -> Self {
        let sessions = if config.tokens.session_file.is_empty() {
            SessionIdStore::in_memory()
        } else {
            SessionIdStore::new(&config.tokens.session_file, config.tokens.session_ttl_secs)
        };
        let bootstrap = TokenBootstrap::new(
            Duration::from_millis(config.tokens.hex_debounce_ms),
            config.tokens.enable_contract_lookup,
        );
        Self {
            transport,
            page_cache: PageCache::new(config.cache.max_pages),
            config,
            resolver: Box::new(SyntacticResolver),
            mapper: TransferMapper::new(TokenMetaCache::new(TOKEN_META_CAPACITY)),
            partner_legs: PartnerLegStore::new(),
            sessions,
            bootstrap,
            ensure: EnsureState::new(),
            cancel: CancelToken::new(),
            query: FeedQuery::default(),
            row_filter: RowFilter::default(),
            user_address: String::new(),
            connection: None,
            pages_loaded: 0,
            leg_rows: Vec::new(),
            rows: Vec::new(),
            loading: false,
            last_error: None,
            fallback_entered: false,
        }
    }

    /// Swap in a chain-aware resolver; the built-in one is syntactic and
    /// cannot derive the native id from an EVM address.
    pub fn with_resolver(mut self, resolver: Box<dyn AddressResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    // ------------------------------------------------------------------
    // Session configuration
    // ------------------------------------------------------------------

    /// Point the feed at a different account. An unresolvable input is a
    /// valid end state and yields an empty feed, not an error.
    pub fn set_address(&mut self, input: &str) {
        let trimmed = input.trim();
        if trimmed == self.user_address {
            return;
        }
        if !self.query.native_address.is_empty() {
            self.page_cache.clear_for_address(&self.query.native_address);
        }
        self.user_address = trimmed.to_string();
        self.query.native_address = self
            .resolver
            .resolve_native(trimmed)
            .unwrap_or_default();
        if !trimmed.is_empty() && self.query.native_address.is_empty() {
            log::info!("[PIPELINE] Address {} not resolvable, feed stays empty", trimmed);
        }
        self.partner_legs.clear();
        self.reset_loaded();
        self.ensure.bump_seq();
        self.last_error = None;
    }

    /// Apply a new filter combination. Resets the loaded session and
    /// re-seeds the token bootstrap machine.
    pub fn set_filter(
        &mut self,
        raw_filter: &str,
        direction: Direction,
        min_amount: Option<String>,
        max_amount: Option<String>,
        swap_only: bool,
    ) {
        let parsed = TokenFilter::parse(raw_filter);
        let strict = matches!(parsed, TokenFilter::Group(_) | TokenFilter::Contract(_));
        self.bootstrap
            .set_filter(raw_filter, strict, false, &self.sessions, Instant::now());

        self.query.direction = direction;
        self.query.min_amount = min_amount;
        self.query.max_amount = max_amount;
        self.query.swap_only = swap_only;
        self.query.reef_only = parsed == TokenFilter::Reef;

        self.row_filter = RowFilter {
            filter: parsed,
            min_raw: self.query.min_amount.as_deref().map(safe_amount),
            max_raw: self.query.max_amount.as_deref().map(safe_amount),
            soft_fallback_active: false,
            server_ids_applied: false,
            swap_only,
        };
        self.sync_query_from_bootstrap();

        self.partner_legs.clear();
        self.reset_loaded();
        self.ensure.bump_seq();
        self.last_error = None;
    }

    // ------------------------------------------------------------------
    // Fetching
    // ------------------------------------------------------------------

    /// Load (or reload) the first page, cache-first. When a strict token
    /// id set yields zero rows the soft fallback widens the query and the
    /// fetch is retried once.
    pub async fn refresh(&mut self) -> FeedResult<()> {
        if self.query.is_empty() {
            self.reset_loaded();
            return Ok(());
        }
        if self.bootstrap.poll_debounce(Instant::now()) {
            self.sync_query_from_bootstrap();
            self.reset_loaded();
        }

        self.load_first_page().await?;
        self.finalize_after_merge().await;

        if self.take_fallback_entered() {
            self.reset_loaded();
            self.load_first_page().await?;
            self.finalize_after_merge().await;
        }
        Ok(())
    }

    /// Advance by one cursor page. Returns whether the edge set grew.
    pub async fn fetch_more(&mut self) -> FeedResult<bool> {
        if self.query.is_empty() {
            return Ok(false);
        }
        let Some(conn) = self.connection.as_ref() else {
            self.refresh().await?;
            return Ok(!self.rows.is_empty());
        };

        let info = conn.page_info.clone().unwrap_or_else(PageInfo::closed);
        if !info.has_next() {
            return Ok(false);
        }
        let Some(cursor) = info.end_cursor else {
            return Ok(false);
        };
        let before = conn.edges.len();

        let key = self.page_key(self.pages_loaded);
        let incoming = match self.page_cache.get(&key) {
            Some(page) => connection_from_cache(page),
            None => {
                match self.fetch_page(Some(&cursor)).await {
                    Ok(fetched) => {
                        self.store_page(self.pages_loaded, &fetched);
                        fetched
                    }
                    Err(err) => {
                        self.last_error = Some(err.clone());
                        return Err(err);
                    }
                }
            }
        };

        self.connection = Some(merge_connections(
            self.connection.as_ref(),
            &incoming,
            Some(&cursor),
        ));
        self.pages_loaded += 1;
        self.finalize_after_merge().await;
        self.last_error = None;

        let after = self.connection.as_ref().map(|c| c.edges.len()).unwrap_or(0);
        Ok(after > before)
    }

    /// One-shot offset window that bypasses the paginated session and the
    /// page cache entirely.
    pub async fn fetch_window(&self, offset: usize, limit: usize) -> FeedResult<Vec<UiTransfer>> {
        if self.query.is_empty() {
            return Ok(Vec::new());
        }
        let transfers = fetch_transfers_window(
            self.transport.as_ref(),
            offset,
            limit,
            self.query.build_where(),
            self.query.order_by(),
        ).await?;
        let edges: Vec<TransferEdge> = transfers
            .into_iter()
            .map(|t| TransferEdge { node: Some(t) })
            .collect();
        Ok(self.mapper.map(&edges, &self.user_address))
    }

    /// Serve a deep page through the offset window when fast mode applies
    /// to the current view. `new_items` offsets past rows that arrived
    /// since the session started.
    pub async fn fast_page(
        &self,
        page_index: usize,
        new_items: usize,
    ) -> FeedResult<Option<Vec<UiTransfer>>> {
        if !self.plain_view() || !should_use_fast_window(&self.config, page_index) {
            return Ok(None);
        }
        let page_size = self.config.pagination.ui_page_size;
        let offset = new_items + page_index * page_size;
        self.fetch_window(offset, page_size).await.map(Some)
    }

    /// Top up the loaded rows until `page_index` (plus the lookahead
    /// ladder) is satisfied or the server runs out of pages.
    pub async fn ensure_page_loaded(
        &mut self,
        page_index: usize,
        new_items: usize,
    ) -> EnsureOutcome {
        let state = self.ensure.clone();
        let cancel = self.cancel.clone();
        // Live-arrived rows only shift the window of the unfiltered view;
        // filtered views ignore the offset.
        let new_items = if self.plain_view() { new_items } else { 0 };
        let required = required_count(&self.config, page_index, new_items);
        let max_attempts = self.config.pagination.max_sequential_fetch_pages;
        let initial = self.progress();
        ensure_loaded(&state, &cancel, self, initial, required, max_attempts, Self::fetch_step)
            .await
    }

    // ------------------------------------------------------------------
    // State exposure
    // ------------------------------------------------------------------

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            transfers: self.rows.clone(),
            loading: self.loading,
            error: self.last_error.clone(),
            has_more: self.has_more(),
            total_count: self.connection.as_ref().and_then(|c| c.total_count),
        }
    }

    pub fn has_more(&self) -> bool {
        self.connection
            .as_ref()
            .and_then(|c| c.page_info.as_ref())
            .map(PageInfo::has_next)
            .unwrap_or(false)
    }

    pub fn available_tokens(&self) -> crate::types::AvailableTokens {
        crate::tokens::probe_available_tokens(&self.rows, &self.sessions)
    }

    pub fn loaded_counts(&self) -> crate::types::LoadedCounts {
        crate::tokens::loaded_counts(&self.rows)
    }

    pub fn bootstrap_phase(&self) -> crate::tokens::BootstrapPhase {
        self.bootstrap.phase()
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.page_cache.metrics()
    }

    /// Handle for aborting in-flight control loops on teardown.
    pub fn cancel_handle(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn load_first_page(&mut self) -> FeedResult<()> {
        let key = self.page_key(0);
        let incoming = match self.page_cache.get(&key) {
            Some(page) => connection_from_cache(page),
            None => {
                let result = self.fetch_page(None).await;
                match result {
                    Ok(fetched) => {
                        self.store_page(0, &fetched);
                        fetched
                    }
                    Err(err) => {
                        self.last_error = Some(err.clone());
                        return Err(err);
                    }
                }
            }
        };
        self.connection = Some(merge_connections(self.connection.as_ref(), &incoming, None));
        self.pages_loaded = self.pages_loaded.max(1);
        self.last_error = None;
        Ok(())
    }

    async fn fetch_page(&mut self, after: Option<&str>) -> FeedResult<TransfersConnection> {
        self.loading = true;
        let result = fetch_transfers_connection(
            self.transport.as_ref(),
            self.config.pagination.api_page_size,
            after,
            self.query.build_where(),
            self.query.order_by(),
        ).await;
        self.loading = false;
        result
    }

    fn fetch_step(p: &mut Self) -> BoxFuture<'_, FeedResult<FetchProgress>> {
        Box::pin(async move {
            p.fetch_more().await?;
            Ok(p.progress())
        })
    }

    fn progress(&self) -> FetchProgress {
        FetchProgress {
            loaded: self.rows.len(),
            has_next: self.has_more(),
        }
    }

    /// Rebuild rows from the merged connection, run partner backfill when
    /// swap view shows a one-sided group, and let the bootstrap machine
    /// observe the result.
    async fn finalize_after_merge(&mut self) {
        self.rebuild_rows();

        if self.query.swap_only {
            let missing = self.missing_partner_hashes();
            if !missing.is_empty() {
                let transport = Arc::clone(&self.transport);
                self.partner_legs
                    .backfill(transport.as_ref(), &missing, &self.config.swaps)
                    .await;
                self.rebuild_rows();
            }
        }

        let added = self.bootstrap.observe_rows(&self.rows, &mut self.sessions);
        if added > 0 {
            self.sync_query_from_bootstrap();
        }
        if self.bootstrap.on_fetch_settled(self.rows.len()) {
            let transport = Arc::clone(&self.transport);
            self.bootstrap
                .run_lookup(transport.as_ref(), &mut self.sessions)
                .await;
            self.sync_query_from_bootstrap();
            self.fallback_entered = true;
        }
    }

    fn rebuild_rows(&mut self) {
        let Some(conn) = self.connection.as_ref() else {
            self.leg_rows.clear();
            self.rows.clear();
            return;
        };

        let mut edges = conn.edges.clone();
        if self.query.swap_only {
            edges.extend(
                self.partner_legs
                    .all_legs()
                    .cloned()
                    .map(|t| TransferEdge { node: Some(t) }),
            );
        }

        let mut mapped = self.mapper.map(&edges, &self.user_address);
        if self.query.amount_filter_active() {
            normalize::sort_by_amount(&mut mapped);
        } else {
            normalize::sort_by_timestamp(&mut mapped);
        }
        let mapped = normalize::ensure_unique(mapped);

        self.leg_rows = mapped.clone();
        let collapsed = if self.query.swap_only {
            collapse_transfer_swaps(mapped)
        } else {
            mapped
        };
        self.rows = self.row_filter.apply(collapsed, &self.sessions);
    }

    fn missing_partner_hashes(&self) -> Vec<String> {
        let Some(conn) = self.connection.as_ref() else {
            return Vec::new();
        };
        let flagged: HashSet<&str> = conn
            .nodes()
            .filter(|t| t.reefswap_action.is_some())
            .filter_map(|t| t.extrinsic_hash.as_deref())
            .collect();
        let candidates: Vec<PartnerCandidate<'_>> = self
            .leg_rows
            .iter()
            .filter(|r| !r.extrinsic_hash.is_empty())
            .map(|r| PartnerCandidate {
                extrinsic_hash: Some(r.extrinsic_hash.as_str()),
                has_swap_flag: flagged.contains(r.extrinsic_hash.as_str()),
                is_nft: r.is_nft,
                kind: r.kind,
            })
            .collect();
        identify_missing_partner_hashes(
            &candidates,
            &self.partner_legs.resolved_hashes(),
            self.query.swap_only,
        )
    }

    fn sync_query_from_bootstrap(&mut self) {
        let soft = self.bootstrap.soft_fallback_active();
        // While the fallback is active the strict id set is suspended so
        // the widened query can actually reach rows outside it.
        let ids = if soft {
            None
        } else {
            self.bootstrap.server_token_ids().map(|s| s.to_vec())
        };
        self.row_filter.server_ids_applied = ids.as_ref().is_some_and(|v| !v.is_empty());
        self.query.token_ids = ids;

        self.row_filter.soft_fallback_active = soft;
        self.query.erc20_only = soft
            && matches!(
                self.row_filter.filter,
                TokenFilter::Group(_) | TokenFilter::Contract(_)
            );
    }

    fn reset_loaded(&mut self) {
        self.connection = None;
        self.pages_loaded = 0;
        self.leg_rows.clear();
        self.rows.clear();
    }

    fn take_fallback_entered(&mut self) -> bool {
        std::mem::take(&mut self.fallback_entered)
    }

    /// The unfiltered default view: no token, direction, amount or swap
    /// constraint.
    fn plain_view(&self) -> bool {
        self.row_filter.filter == TokenFilter::All
            && self.query.direction == Direction::Any
            && !self.query.swap_only
            && !self.query.amount_filter_active()
    }

    fn page_key(&self, page: usize) -> PageKey {
        if self.plain_view() {
            PageKey::plain(&self.query.native_address, page)
        } else {
            PageKey::filtered(&self.query.native_address, page, &self.variant_signature())
        }
    }

    /// Must cover every query input that changes the server result set,
    /// the widened fallback shape included, or a retry can hit a stale
    /// cached page.
    fn variant_signature(&self) -> String {
        format!(
            "{:?}|{:?}|{}|{}|{}|{}|{}",
            self.row_filter.filter,
            self.query.direction,
            self.query.min_amount.as_deref().unwrap_or(""),
            self.query.max_amount.as_deref().unwrap_or(""),
            self.query.swap_only,
            self.query.token_ids.as_deref().unwrap_or(&[]).join(","),
            self.query.erc20_only,
        )
    }

    fn store_page(&self, page: usize, conn: &TransfersConnection) {
        self.page_cache.insert(self.page_key(page), CachedPage {
            edges: conn.edges.clone(),
            page_info: conn.page_info.clone().unwrap_or_else(PageInfo::closed),
            native_address: self.query.native_address.clone(),
            total_count: conn.total_count.map(|c| c as i64).unwrap_or(0),
        });
    }
}

fn connection_from_cache(page: CachedPage) -> TransfersConnection {
    TransfersConnection {
        edges: page.edges,
        page_info: Some(page.page_info),
        total_count: u64::try_from(page.total_count).ok(),
    }
}

/// Swap-view feed backed by the pool-event squid instead of the transfer
/// ledger, paginated by the same cursor conventions.
pub struct PoolSwapFeed {
    transport: Arc<dyn FeedTransport>,
    page_size: usize,
    address: String,
    events: Vec<PoolEventNode>,
    page_info: PageInfo,
    loading: bool,
    last_error: Option<FeedError>,
}

impl PoolSwapFeed {
    pub fn new(transport: Arc<dyn FeedTransport>, page_size: usize) -> Self {
        Self {
            transport,
            page_size: page_size.max(1),
            address: String::new(),
            events: Vec::new(),
            page_info: PageInfo::default(),
            loading: false,
            last_error: None,
        }
    }

    pub fn set_address(&mut self, address: &str) {
        let trimmed = address.trim();
        if trimmed == self.address {
            return;
        }
        self.address = trimmed.to_string();
        self.events.clear();
        self.page_info = PageInfo::default();
        self.last_error = None;
    }

    pub async fn refresh(&mut self) -> FeedResult<()> {
        self.events.clear();
        self.page_info = PageInfo::default();
        self.fetch(None).await
    }

    pub async fn fetch_more(&mut self) -> FeedResult<bool> {
        if !self.page_info.has_next() {
            return Ok(false);
        }
        let Some(cursor) = self.page_info.end_cursor.clone() else {
            return Ok(false);
        };
        let before = self.events.len();
        self.fetch(Some(&cursor)).await?;
        Ok(self.events.len() > before)
    }

    /// Aggregated swap rows in arrival order of their groups.
    pub fn rows(&self) -> Vec<UiTransfer> {
        aggregate_pool_events(&self.events)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            transfers: self.rows(),
            loading: self.loading,
            error: self.last_error.clone(),
            has_more: self.page_info.has_next(),
            total_count: None,
        }
    }

    async fn fetch(&mut self, after: Option<&str>) -> FeedResult<()> {
        if self.address.is_empty() {
            return Ok(());
        }
        self.loading = true;
        let result = fetch_pool_events(
            self.transport.as_ref(),
            self.page_size,
            after,
            &self.address,
        ).await;
        self.loading = false;

        match result {
            Ok((nodes, page_info)) => {
                let known: HashSet<String> = self.events.iter().map(|e| e.id.clone()).collect();
                self.events.extend(nodes.into_iter().filter(|n| !known.contains(&n.id)));
                self.page_info = page_info;
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ Endpoint, GraphqlRequest, PAGINATED_TRANSFERS_QUERY };
    use async_trait::async_trait;
    use serde_json::{ json, Value };
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    const USER: &str = "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY";

    struct MockTransport {
        connection_pages: Mutex<VecDeque<Value>>,
        window_payload: Mutex<Option<Value>>,
        pool_pages: Mutex<VecDeque<Value>>,
        transfer_wheres: Mutex<Vec<Value>>,
        network_calls: AtomicUsize,
    }

    impl MockTransport {
        fn with_pages(pages: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                connection_pages: Mutex::new(pages.into_iter().collect()),
                window_payload: Mutex::new(None),
                pool_pages: Mutex::new(VecDeque::new()),
                transfer_wheres: Mutex::new(Vec::new()),
                network_calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.network_calls.load(Ordering::SeqCst)
        }

        fn wheres(&self) -> Vec<Value> {
            self.transfer_wheres.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedTransport for MockTransport {
        async fn query(&self, _: Endpoint, request: GraphqlRequest) -> FeedResult<Value> {
            self.network_calls.fetch_add(1, Ordering::SeqCst);
            if request.query == PAGINATED_TRANSFERS_QUERY {
                self.transfer_wheres
                    .lock()
                    .unwrap()
                    .push(request.variables["where"].clone());
                return self
                    .connection_pages
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| FeedError::transport("mock", "no scripted page"));
            }
            if request.query.contains("poolEventsConnection") {
                return self
                    .pool_pages
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| FeedError::transport("mock", "no scripted pool page"));
            }
            self.window_payload
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| FeedError::transport("mock", "no scripted window"))
        }
    }

    fn edge(id: &str, ts: &str, amount: &str, incoming: bool) -> Value {
        let (from, to) = if incoming { ("5Other", USER) } else { (USER, "5Other") };
        json!({
            "node": {
                "id": id,
                "amount": amount,
                "timestamp": ts,
                "success": true,
                "type": "Native",
                "extrinsicHash": format!("0xhash-{id}"),
                "from": { "id": from },
                "to": { "id": to },
                "token": { "id": "reef-token", "name": "REEF" }
            }
        })
    }

    fn page(edges: Vec<Value>, has_next: bool, cursor: Option<&str>, total: u64) -> Value {
        json!({
            "transfersConnection": {
                "edges": edges,
                "pageInfo": { "hasNextPage": has_next, "endCursor": cursor },
                "totalCount": total
            }
        })
    }

    fn pipeline(transport: Arc<MockTransport>) -> TransactionPipeline {
        let mut p = TransactionPipeline::new(transport, PipelineConfig::default());
        p.set_address(USER);
        p
    }

    #[tokio::test]
    async fn refresh_maps_and_orders_newest_first() {
        let transport = MockTransport::with_pages(vec![page(
            vec![
                edge("t-old", "2023-01-01T00:00:00Z", "100", true),
                edge("t-new", "2023-06-01T00:00:00Z", "200", false),
            ],
            false,
            None,
            2,
        )]);
        let mut p = pipeline(transport.clone());

        p.refresh().await.unwrap();
        let snap = p.snapshot();
        assert_eq!(snap.transfers.len(), 2);
        assert_eq!(snap.transfers[0].id, "t-new");
        assert_eq!(snap.total_count, Some(2));
        assert!(!snap.has_more);
        assert!(snap.error.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn fetch_more_appends_and_deduplicates() {
        let transport = MockTransport::with_pages(vec![
            page(
                vec![
                    edge("t1", "2023-06-03T00:00:00Z", "1", true),
                    edge("t2", "2023-06-02T00:00:00Z", "2", true),
                ],
                true,
                Some("c1"),
                3,
            ),
            // t2 re-delivered on the page boundary.
            page(
                vec![
                    edge("t2", "2023-06-02T00:00:00Z", "2", true),
                    edge("t3", "2023-06-01T00:00:00Z", "3", true),
                ],
                false,
                None,
                3,
            ),
        ]);
        let mut p = pipeline(transport.clone());

        p.refresh().await.unwrap();
        assert!(p.fetch_more().await.unwrap());

        let ids: Vec<_> = p.snapshot().transfers.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, ["t1", "t2", "t3"]);
        assert!(!p.has_more());
        assert!(!p.fetch_more().await.unwrap());
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn second_refresh_is_served_from_the_page_cache() {
        let transport = MockTransport::with_pages(vec![page(
            vec![edge("t1", "2023-06-01T00:00:00Z", "1", true)],
            false,
            None,
            1,
        )]);
        let mut p = pipeline(transport.clone());

        p.refresh().await.unwrap();
        p.refresh().await.unwrap();

        assert_eq!(p.snapshot().transfers.len(), 1);
        assert_eq!(transport.calls(), 1);
        assert_eq!(p.cache_metrics().hits, 1);
    }

    #[tokio::test]
    async fn unresolvable_address_yields_empty_feed_without_network() {
        let transport = MockTransport::with_pages(vec![]);
        let mut p = TransactionPipeline::new(transport.clone(), PipelineConfig::default());
        p.set_address("not-an-address");

        p.refresh().await.unwrap();
        let snap = p.snapshot();
        assert!(snap.transfers.is_empty());
        assert!(snap.error.is_none());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn transport_error_is_surfaced_in_the_snapshot() {
        let transport = MockTransport::with_pages(vec![]);
        let mut p = pipeline(transport);

        assert!(p.refresh().await.is_err());
        assert!(p.snapshot().error.is_some());
    }

    #[tokio::test]
    async fn ensure_page_loaded_tops_up_until_server_closes() {
        let pages: Vec<Value> = (0..3)
            .map(|n| {
                let edges: Vec<Value> = (0..10)
                    .map(|i| {
                        edge(
                            &format!("p{n}-{i:02}"),
                            &format!("2023-06-0{}T00:00:{:02}Z", 3 - n, 59 - i),
                            "1",
                            true,
                        )
                    })
                    .collect();
                let last = n == 2;
                page(edges, !last, if last { None } else { Some("c") }, 30)
            })
            .collect();
        let transport = MockTransport::with_pages(pages);
        let mut p = pipeline(transport.clone());

        p.refresh().await.unwrap();
        assert_eq!(p.snapshot().transfers.len(), 10);

        let outcome = p.ensure_page_loaded(0, 0).await;
        assert!(outcome.completed);
        assert_eq!(p.snapshot().transfers.len(), 30);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test]
    async fn fast_page_applies_only_to_the_plain_deep_view() {
        let transport = MockTransport::with_pages(vec![]);
        *transport.window_payload.lock().unwrap() = Some(json!({
            "transfers": [
                {
                    "id": "w1",
                    "amount": "7",
                    "timestamp": "2023-06-01T00:00:00Z",
                    "success": true,
                    "type": "Native",
                    "extrinsicHash": "0xw1",
                    "from": { "id": "5Other" },
                    "to": { "id": USER },
                    "token": { "id": "reef-token", "name": "REEF" }
                }
            ]
        }));
        let p = pipeline(transport.clone());

        // Below the deep-page threshold the fast path declines.
        assert!(p.fast_page(0, 0).await.unwrap().is_none());

        let rows = p.fast_page(2, 0).await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "w1");
    }

    fn erc20_edge(id: &str, token_id: &str, token_name: &str) -> Value {
        json!({
            "node": {
                "id": id,
                "amount": "1000",
                "timestamp": "2023-06-01T00:00:00Z",
                "success": true,
                "type": "ERC20",
                "extrinsicHash": format!("0xhash-{id}"),
                "from": { "id": "5Other" },
                "to": { "id": USER },
                "token": { "id": token_id, "name": token_name }
            }
        })
    }

    #[tokio::test]
    async fn soft_fallback_retry_widens_the_query_and_surfaces_rows() {
        // Strict id set finds nothing; the widened by-type query holds a
        // discoverable USDC row under an id outside the base set.
        let transport = MockTransport::with_pages(vec![
            page(vec![], false, None, 0),
            page(vec![erc20_edge("t-usdc", "0xnewusdc", "USDC")], false, None, 1),
        ]);
        let mut config = PipelineConfig::default();
        config.tokens.enable_contract_lookup = false;
        let mut p = TransactionPipeline::new(transport.clone(), config);
        p.set_address(USER);
        p.set_filter("usdc", Direction::Any, None, None, false);

        p.refresh().await.unwrap();

        let snap = p.snapshot();
        assert_eq!(snap.transfers.len(), 1);
        assert_eq!(snap.transfers[0].token.name, "USDC");
        assert_eq!(transport.calls(), 2);

        let wheres = transport.wheres();
        // First request pins the strict id set.
        assert_eq!(
            wheres[0]["AND"][1]["token"]["id_in"][0],
            crate::tokens::TokenGroup::Usdc.base_ids()[0]
        );
        // The retry drops the id set and widens to the token type.
        assert_eq!(wheres[1]["AND"][1]["type_eq"], "ERC20");
        assert!(!wheres[1].to_string().contains("id_in"));

        // The discovered id re-tightens the machine.
        assert_eq!(p.bootstrap_phase(), crate::tokens::BootstrapPhase::Discovered);
    }

    #[tokio::test]
    async fn new_items_offset_applies_only_to_the_plain_view() {
        let pages: Vec<Value> = (0..3)
            .map(|n| {
                let edges: Vec<Value> = (0..10)
                    .map(|i| {
                        edge(
                            &format!("f{n}-{i:02}"),
                            &format!("2023-06-0{}T00:00:{:02}Z", 3 - n, 59 - i),
                            "1",
                            true,
                        )
                    })
                    .collect();
                let last = n == 2;
                page(edges, !last, if last { None } else { Some("c") }, 30)
            })
            .collect();
        let transport = MockTransport::with_pages(pages);
        let mut p = pipeline(transport.clone());
        p.set_filter("reef", Direction::Any, None, None, false);

        p.refresh().await.unwrap();

        // 30 rows satisfy page 0 plus the ladder; a live-arrival offset of
        // 25 would demand 55 and report the server as exhausted.
        let outcome = p.ensure_page_loaded(0, 25).await;
        assert!(outcome.completed);
        assert!(outcome.maxed.is_none());
        assert_eq!(p.snapshot().transfers.len(), 30);
    }

    #[tokio::test]
    async fn filter_change_invalidates_the_session() {
        let transport = MockTransport::with_pages(vec![
            page(vec![edge("t1", "2023-06-01T00:00:00Z", "1", true)], false, None, 1),
            page(vec![edge("t1", "2023-06-01T00:00:00Z", "1", true)], false, None, 1),
        ]);
        let mut p = pipeline(transport.clone());
        p.refresh().await.unwrap();
        let seq_before = p.ensure.seq();

        p.set_filter("reef", Direction::Incoming, None, None, false);
        assert!(p.snapshot().transfers.is_empty());
        assert!(p.ensure.seq() > seq_before);

        // The reef view misses the plain-variant cache entry and refetches.
        p.refresh().await.unwrap();
        assert_eq!(p.snapshot().transfers.len(), 1);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn pool_swap_feed_aggregates_paired_legs() {
        let transport = MockTransport::with_pages(vec![]);
        *transport.pool_pages.lock().unwrap() = VecDeque::from(vec![json!({
            "poolEventsConnection": {
                "edges": [
                    {
                        "node": {
                            "id": "100-1",
                            "blockHeight": 100,
                            "indexInBlock": 1,
                            "timestamp": "2023-06-01T00:00:00Z",
                            "type": "Swap",
                            "senderAddress": USER,
                            "amountIn1": "1000",
                            "amount2": "900",
                            "pool": {
                                "id": "pool-1",
                                "token1": { "id": "0xaaa", "name": "TKA", "decimals": 18 },
                                "token2": { "id": "0xbbb", "name": "TKB", "decimals": 18 }
                            }
                        }
                    },
                    {
                        "node": {
                            "id": "100-2",
                            "blockHeight": 100,
                            "indexInBlock": 1,
                            "timestamp": "2023-06-01T00:00:00Z",
                            "type": "Swap",
                            "senderAddress": USER,
                            "amount1": "900",
                            "pool": {
                                "id": "pool-1",
                                "token1": { "id": "0xaaa", "name": "TKA", "decimals": 18 },
                                "token2": { "id": "0xbbb", "name": "TKB", "decimals": 18 }
                            }
                        }
                    }
                ],
                "pageInfo": { "hasNextPage": false, "endCursor": null }
            }
        })]);

        let mut feed = PoolSwapFeed::new(transport, 20);
        feed.set_address(USER);
        feed.refresh().await.unwrap();

        let rows = feed.rows();
        assert_eq!(rows.len(), 1);
        let info = rows[0].swap_info.as_ref().unwrap();
        assert_eq!(info.sold.amount, "1000");
        assert_eq!(info.bought.amount, "900");
        assert!(!feed.snapshot().has_more);
    }
}
