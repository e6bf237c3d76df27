use anyhow::{ Context, Result };
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub explorer_url: String,
    pub swap_squid_url: String,
    pub pagination: PaginationConfig,
    pub cache: CacheConfig,
    pub swaps: SwapsConfig,
    pub tokens: TokensConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Rows per consumer-facing page.
    pub ui_page_size: usize,
    /// Rows fetched per backend request.
    pub api_page_size: usize,
    /// Extra UI pages kept loaded ahead of the current one.
    pub ladder_pages: usize,
    /// Ceiling on ensure-loaded fetch iterations before giving up.
    pub max_sequential_fetch_pages: usize,
    pub enable_fast_offset_mode: bool,
    /// First UI page index that routes through the offset window path.
    pub fast_offset_threshold_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Max cached pages before FIFO eviction.
    pub max_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapsConfig {
    /// Unresolved hashes looked up per partner backfill round.
    pub partner_batch_hashes: usize,
    /// Hard cap on rows fetched in one partner backfill query.
    pub partner_row_cap: usize,
    /// Rows requested per hash, before the cap.
    pub partner_rows_per_hash: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    /// Quiet period before a hex filter input is applied.
    pub hex_debounce_ms: u64,
    /// How long remembered session token ids stay valid.
    pub session_ttl_secs: u64,
    /// Where remembered session ids are persisted; empty disables persistence.
    #[serde(default)]
    pub session_file: String,
    /// Allow the verified-contracts-by-name lookup during soft fallback.
    #[serde(default = "default_true")]
    pub enable_contract_lookup: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub request_timeout_secs: u64,
    /// One extra attempt on 429/502/503 and timeouts.
    pub retry_transient: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            retry_transient: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            explorer_url: "https://squid.subsquid.io/reef-explorer/graphql".to_string(),
            swap_squid_url: "https://squid.subsquid.io/reef-swap/graphql".to_string(),
            pagination: PaginationConfig {
                ui_page_size: 10,
                api_page_size: 30,
                ladder_pages: 3,
                max_sequential_fetch_pages: 20,
                enable_fast_offset_mode: true,
                fast_offset_threshold_pages: 2,
            },
            cache: CacheConfig {
                max_pages: 50,
            },
            swaps: SwapsConfig {
                partner_batch_hashes: 20,
                partner_row_cap: 400,
                partner_rows_per_hash: 10,
            },
            tokens: TokensConfig {
                hex_debounce_ms: 150,
                session_ttl_secs: 7 * 24 * 60 * 60, // 7 days
                session_file: String::new(),
                enable_contract_lookup: true,
            },
            network: NetworkConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let default_config = Self::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs
            ::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = serde_json
            ::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        // Validate required fields
        if config.explorer_url.is_empty() {
            return Err(anyhow::anyhow!("explorer_url is required in config"));
        }
        url::Url
            ::parse(&config.explorer_url)
            .with_context(|| format!("explorer_url is not a valid url: {}", config.explorer_url))?;
        if !config.swap_squid_url.is_empty() {
            url::Url
                ::parse(&config.swap_squid_url)
                .with_context(|| {
                    format!("swap_squid_url is not a valid url: {}", config.swap_squid_url)
                })?;
        }
        if config.pagination.ui_page_size == 0 || config.pagination.api_page_size == 0 {
            return Err(anyhow::anyhow!("page sizes must be non-zero"));
        }

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = serde_json
            ::to_string_pretty(self)
            .with_context(|| "Failed to serialize config")?;

        fs::write(path, content).with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Rows that must be loaded to show `page_index` plus the lookahead
    /// ladder.
    pub fn required_rows(&self, page_index: usize) -> usize {
        (page_index + self.pagination.ladder_pages) * self.pagination.ui_page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let path = path.to_str().unwrap();

        // First load materializes the defaults on disk.
        let first = PipelineConfig::load(path).unwrap();
        assert_eq!(first.pagination.ui_page_size, 10);
        assert_eq!(first.cache.max_pages, 50);

        let second = PipelineConfig::load(path).unwrap();
        assert_eq!(second.pagination.api_page_size, first.pagination.api_page_size);
        assert_eq!(second.swaps.partner_row_cap, 400);
    }

    #[test]
    fn required_rows_includes_ladder() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.required_rows(0), 30);
        assert_eq!(cfg.required_rows(4), 70);
    }
}
