/// Bootstrap state machine for strict token filtering.
///
/// Strict filtering needs exact contract ids, which are learned over
/// time. The machine moves between: inactive (no strict filter), seeded
/// (id set applied), soft fallback (strict returned nothing, degrade to
/// name matching) and discovered (session set gained an id, back to
/// strict). Soft fallback is attempted at most once per filter
/// activation.

use super::ids::{ SessionIdStore, TokenGroup };
use crate::transport::{ FeedTransport, lookup_verified_contract_ids };
use crate::types::UiTransfer;
use std::time::{ Duration, Instant };

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenFilter {
    All,
    Reef,
    Group(TokenGroup),
    /// Literal contract address, original casing preserved.
    Contract(String),
    /// Free-form name; filtered by name heuristics only.
    Name(String),
}

impl Default for TokenFilter {
    fn default() -> Self {
        TokenFilter::All
    }
}

impl TokenFilter {
    pub fn parse(input: &str) -> TokenFilter {
        let trimmed = input.trim();
        match trimmed.to_lowercase().as_str() {
            "" | "all" => TokenFilter::All,
            "reef" => TokenFilter::Reef,
            _ => {
                if let Some(group) = TokenGroup::from_filter(trimmed) {
                    TokenFilter::Group(group)
                } else if is_hex_address(trimmed) {
                    TokenFilter::Contract(trimmed.to_string())
                } else {
                    TokenFilter::Name(trimmed.to_string())
                }
            }
        }
    }
}

fn is_hex_address(v: &str) -> bool {
    v.strip_prefix("0x")
        .map(|rest| rest.len() == 40 && rest.bytes().all(|b| b.is_ascii_hexdigit()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Inactive,
    Seeded,
    SoftFallback,
    Discovered,
}

pub struct TokenBootstrap {
    filter: TokenFilter,
    strict: bool,
    enforce_strict: bool,
    server_token_ids: Option<Vec<String>>,
    soft_fallback_active: bool,
    soft_fallback_attempted: bool,
    lookup_enabled: bool,
    lookup_done: bool,
    discovered: bool,
    pending_hex: Option<(String, Instant)>,
    debounce: Duration,
}

impl TokenBootstrap {
    pub fn new(debounce: Duration, lookup_enabled: bool) -> Self {
        Self {
            filter: TokenFilter::All,
            strict: false,
            enforce_strict: false,
            server_token_ids: None,
            soft_fallback_active: false,
            soft_fallback_attempted: false,
            lookup_enabled,
            lookup_done: false,
            discovered: false,
            pending_hex: None,
            debounce,
        }
    }

    /// Apply a filter change. Fallback bookkeeping resets here and only
    /// here, so one activation gets at most one soft-fallback attempt.
    pub fn set_filter(
        &mut self,
        filter: &str,
        strict: bool,
        enforce_strict: bool,
        sessions: &SessionIdStore,
        now: Instant,
    ) {
        self.filter = TokenFilter::parse(filter);
        self.strict = strict;
        self.enforce_strict = enforce_strict;
        self.soft_fallback_active = false;
        self.soft_fallback_attempted = false;
        self.lookup_done = false;
        self.discovered = false;
        self.pending_hex = None;
        self.server_token_ids = None;

        if !strict {
            return;
        }
        match &self.filter {
            TokenFilter::Group(group) => {
                let ids = sessions.effective_ids(*group);
                if !ids.is_empty() {
                    self.server_token_ids = Some(ids);
                }
            }
            TokenFilter::Contract(addr) => {
                // Coalesce rapid typing before applying the literal id.
                self.pending_hex = Some((addr.clone(), now + self.debounce));
            }
            _ => {}
        }
    }

    /// Apply a debounced hex filter whose quiet period has elapsed.
    /// Returns true when the id set changed.
    pub fn poll_debounce(&mut self, now: Instant) -> bool {
        let Some((addr, deadline)) = &self.pending_hex else {
            return false;
        };
        if now < *deadline {
            return false;
        }
        let next = Some(vec![addr.clone()]);
        self.pending_hex = None;
        if self.server_token_ids != next {
            self.server_token_ids = next;
            return true;
        }
        false
    }

    /// Record a settled (non-loading) fetch under the current filter.
    /// Returns true when this transitions into soft fallback.
    pub fn on_fetch_settled(&mut self, row_count: usize) -> bool {
        if self.enforce_strict {
            self.soft_fallback_active = false;
            return false;
        }
        if !self.strict || !matches!(self.filter, TokenFilter::Group(_)) {
            self.soft_fallback_active = false;
            return false;
        }
        let ids_known = self
            .server_token_ids
            .as_ref()
            .map(|ids| !ids.is_empty())
            .unwrap_or(false);
        if !ids_known {
            return false;
        }
        if row_count == 0 && !self.soft_fallback_active && !self.soft_fallback_attempted {
            self.soft_fallback_active = true;
            self.soft_fallback_attempted = true;
            log::debug!("[TOKENS] Strict filter returned no rows, entering soft fallback");
            return true;
        }
        false
    }

    /// Scan loaded rows (including swap legs) for tokens whose name is a
    /// synonym of the active group; discovered ids extend the session set
    /// and re-tighten the filter. Returns how many ids were added.
    pub fn observe_rows(&mut self, rows: &[UiTransfer], sessions: &mut SessionIdStore) -> usize {
        if !self.strict {
            return 0;
        }
        let TokenFilter::Group(group) = self.filter else {
            return 0;
        };

        let mut added = 0;
        let mut observe = |id: &str, name: &str| {
            if !id.is_empty() && group.matches_name(name) && sessions.add(group, id) {
                added += 1;
            }
        };
        for row in rows {
            observe(&row.token.id, &row.token.name);
            if let Some(info) = &row.swap_info {
                observe(&info.sold.token.id, &info.sold.token.name);
                observe(&info.bought.token.id, &info.bought.token.name);
            }
        }

        if added > 0 {
            self.server_token_ids = Some(sessions.effective_ids(group));
            if self.soft_fallback_active {
                self.soft_fallback_active = false;
                self.discovered = true;
                log::debug!("[TOKENS] Discovered {} id(s), returning to strict mode", added);
            }
        }
        added
    }

    /// One-shot verified-contracts-by-name lookup, gated behind the
    /// feature flag and only while in soft fallback with an empty session
    /// set. Failures are swallowed; the flag still flips so the lookup is
    /// not re-issued.
    pub async fn run_lookup(
        &mut self,
        transport: &dyn FeedTransport,
        sessions: &mut SessionIdStore,
    ) {
        let TokenFilter::Group(group) = self.filter else {
            return;
        };
        if !self.strict || !self.soft_fallback_active || self.lookup_done {
            return;
        }
        if !self.lookup_enabled || sessions.len(group) > 0 {
            self.lookup_done = true;
            return;
        }
        self.lookup_done = true;

        let needle = group.synonyms()[0];
        match lookup_verified_contract_ids(transport, needle).await {
            Ok(ids) => {
                let mut added = 0;
                for id in ids {
                    if sessions.add(group, &id) {
                        added += 1;
                    }
                }
                if added > 0 {
                    self.server_token_ids = Some(sessions.effective_ids(group));
                    self.soft_fallback_active = false;
                    self.discovered = true;
                }
            }
            Err(err) => {
                log::warn!("[TOKENS] Verified contract lookup failed: {}", err);
            }
        }
    }

    pub fn phase(&self) -> BootstrapPhase {
        if self.discovered {
            BootstrapPhase::Discovered
        } else if self.soft_fallback_active {
            BootstrapPhase::SoftFallback
        } else if self.server_token_ids.is_some() {
            BootstrapPhase::Seeded
        } else {
            BootstrapPhase::Inactive
        }
    }

    pub fn filter(&self) -> &TokenFilter {
        &self.filter
    }

    pub fn server_token_ids(&self) -> Option<&[String]> {
        self.server_token_ids.as_deref()
    }

    pub fn soft_fallback_active(&self) -> bool {
        self.soft_fallback_active
    }
}
