//! Environment-driven service configuration.
//!
//! Every tuning knob has a sane default in the core config structs; env vars
//! only override. Values are read once at startup, never per request.

use jurisearch_core::{ExtractConfig, FetchConfig, MatchConfig, RenderMode};
use jurisearch_local::RelayConfig;

fn env_nonempty(k: &str) -> Option<String> {
    std::env::var(k)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u64(k: &str) -> Option<u64> {
    env_nonempty(k).and_then(|s| s.parse().ok())
}

fn env_usize(k: &str) -> Option<usize> {
    env_nonempty(k).and_then(|s| s.parse().ok())
}

fn env_f64(k: &str) -> Option<f64> {
    env_nonempty(k).and_then(|s| s.parse().ok())
}

/// Everything the serving surface needs, resolved from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub matching: MatchConfig,
    pub relay: RelayConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let fetch_defaults = FetchConfig::default();
        let render = match env_nonempty("JURISEARCH_RENDER").as_deref() {
            Some("headless") => RenderMode::Headless,
            Some("static") => RenderMode::Static,
            _ => fetch_defaults.render,
        };
        let fetch = FetchConfig {
            source_url: env_nonempty("JURISEARCH_SOURCE_URL")
                .unwrap_or(fetch_defaults.source_url),
            render,
            timeout_ms: env_u64("JURISEARCH_FETCH_TIMEOUT_MS")
                .unwrap_or(fetch_defaults.timeout_ms),
            connect_timeout_ms: fetch_defaults.connect_timeout_ms,
            retries: fetch_defaults.retries,
            render_timeout_ms: env_u64("JURISEARCH_RENDER_TIMEOUT_MS")
                .unwrap_or(fetch_defaults.render_timeout_ms),
        };

        let extract_defaults = ExtractConfig::default();
        let extract = ExtractConfig {
            fallback_min_blocks: env_usize("JURISEARCH_FALLBACK_MIN_BLOCKS")
                .unwrap_or(extract_defaults.fallback_min_blocks),
            max_body_chars: env_usize("JURISEARCH_MAX_BODY_CHARS")
                .unwrap_or(extract_defaults.max_body_chars),
            ..extract_defaults
        };

        let match_defaults = MatchConfig::default();
        let matching = MatchConfig {
            threshold: env_f64("JURISEARCH_MATCH_THRESHOLD").unwrap_or(match_defaults.threshold),
            max_results: env_usize("JURISEARCH_MAX_RESULTS").unwrap_or(match_defaults.max_results),
        };

        Self {
            fetch,
            extract,
            matching,
            relay: RelayConfig::from_env(),
        }
    }
}
