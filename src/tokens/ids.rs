/// Known token-contract id sets per symbolic group, plus the persisted
/// session set of ids discovered at runtime.
///
/// Contract ids for a symbol are not enumerable server-side, so the base
/// sets only seed filtering; the session set grows as matching tokens are
/// observed and survives restarts for a bounded time.

use chrono::Utc;
use serde::{ Deserialize, Serialize };
use std::collections::{ HashMap, HashSet };
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenGroup {
    Usdc,
    Mrd,
}

impl TokenGroup {
    pub fn base_ids(&self) -> &'static [&'static str] {
        match self {
            TokenGroup::Usdc => &["0x7922d8785d93e692bb584e659b607fa821e6a91a"],
            TokenGroup::Mrd => &["0x95a2af50040b7256a4b4c405a4afd4dd573da115"],
        }
    }

    /// Case-insensitive token names treated as this group.
    pub fn synonyms(&self) -> &'static [&'static str] {
        match self {
            TokenGroup::Usdc => &["usdc", "usdc.e", "usd coin"],
            TokenGroup::Mrd => &["mrd"],
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.synonyms().contains(&lower.as_str())
    }

    pub fn from_filter(filter: &str) -> Option<TokenGroup> {
        match filter.to_lowercase().as_str() {
            "usdc" => Some(TokenGroup::Usdc),
            "mrd" => Some(TokenGroup::Mrd),
            _ => None,
        }
    }

    fn storage_name(&self) -> &'static str {
        match self {
            TokenGroup::Usdc => "usdc",
            TokenGroup::Mrd => "mrd",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedGroup {
    ids: Vec<String>,
    /// Epoch milliseconds of the last save.
    ts: i64,
}

/// Runtime-discovered contract ids per group, persisted as one JSON file.
/// Entries older than the TTL are dropped on load. Disk failures are
/// logged and swallowed; the store keeps working in memory.
pub struct SessionIdStore {
    sets: HashMap<TokenGroup, HashSet<String>>,
    path: Option<PathBuf>,
    ttl_ms: i64,
}

impl SessionIdStore {
    /// `path` empty disables persistence.
    pub fn new(path: &str, ttl_secs: u64) -> Self {
        let mut store = Self {
            sets: HashMap::new(),
            path: if path.is_empty() { None } else { Some(PathBuf::from(path)) },
            ttl_ms: (ttl_secs as i64) * 1000,
        };
        store.load();
        store
    }

    pub fn in_memory() -> Self {
        Self {
            sets: HashMap::new(),
            path: None,
            ttl_ms: i64::MAX,
        }
    }

    pub fn ids(&self, group: TokenGroup) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sets
            .get(&group)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn len(&self, group: TokenGroup) -> usize {
        self.sets.get(&group).map(HashSet::len).unwrap_or(0)
    }

    pub fn contains(&self, group: TokenGroup, id: &str) -> bool {
        let lower = id.to_lowercase();
        self.sets.get(&group).map(|s| s.contains(&lower)).unwrap_or(false)
    }

    /// Add an id (lowercased). Persists when something new landed.
    /// Returns true for a new entry.
    pub fn add(&mut self, group: TokenGroup, id: &str) -> bool {
        let lower = id.to_lowercase();
        if lower.is_empty() {
            return false;
        }
        let added = self.sets.entry(group).or_default().insert(lower);
        if added {
            self.persist();
        }
        added
    }

    /// Base ids unioned with the session set, lowercased and sorted.
    pub fn effective_ids(&self, group: TokenGroup) -> Vec<String> {
        let mut out: HashSet<String> = group
            .base_ids()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if let Some(session) = self.sets.get(&group) {
            out.extend(session.iter().cloned());
        }
        let mut ids: Vec<String> = out.into_iter().collect();
        ids.sort();
        ids
    }

    fn load(&mut self) {
        let Some(path) = &self.path else {
            return;
        };
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        let parsed: HashMap<String, PersistedGroup> = match serde_json::from_str(&content) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("[TOKENS] Ignoring corrupt session id file {}: {}", path.display(), e);
                return;
            }
        };
        let now = Utc::now().timestamp_millis();
        for group in [TokenGroup::Usdc, TokenGroup::Mrd] {
            if let Some(entry) = parsed.get(group.storage_name()) {
                if now - entry.ts > self.ttl_ms {
                    continue;
                }
                let set: HashSet<String> = entry
                    .ids
                    .iter()
                    .map(|s| s.to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect();
                if !set.is_empty() {
                    self.sets.insert(group, set);
                }
            }
        }
    }

    fn persist(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let now = Utc::now().timestamp_millis();
        let mut out: HashMap<&str, PersistedGroup> = HashMap::new();
        for (group, set) in &self.sets {
            let mut ids: Vec<String> = set.iter().cloned().collect();
            ids.sort();
            out.insert(group.storage_name(), PersistedGroup { ids, ts: now });
        }
        match serde_json::to_string_pretty(&out) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    log::warn!("[TOKENS] Failed to persist session ids: {}", e);
                }
            }
            Err(e) => log::warn!("[TOKENS] Failed to serialize session ids: {}", e),
        }
    }
}
