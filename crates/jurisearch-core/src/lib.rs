use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("render failed: {0}")]
    Render(String),
    #[error("render timed out after {ms} ms")]
    RenderTimeout { ms: u64 },
    #[error("extract failed: {0}")]
    Extract(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("upstream status {status}: {detail}")]
    Upstream { status: u16, detail: String },
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Default compilation page queried when no override is configured.
pub const DEFAULT_SOURCE_URL: &str = "https://www.te.gob.mx/iuse_old2025/front/compilacion";

/// One extracted unit of legal-precedent text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentBlock {
    /// Identifier ("clave"), canonical form `NN/NNNN` or a looser
    /// `digits/digits`; absent only for hand-built blocks.
    pub key: Option<String>,
    /// Short heading ("rubro"), the case-summary headline.
    pub title: String,
    /// Free-form textual date, e.g. `15 de marzo de 2018`.
    pub date: Option<String>,
    /// Body text. Extractors truncate this to `ExtractConfig::max_body_chars`
    /// plus an ellipsis marker before constructing the block.
    pub body: String,
}

/// One ranked answer produced by the matcher. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub key: String,
    pub title: String,
    pub date: Option<String>,
    /// Verbatim copy of `title`, kept as its own field for the wire shape.
    pub summary: String,
    /// Body text, present only when the caller asked for full text.
    pub full: Option<String>,
}

/// What one search pass produced: ranked results, or nothing plus a
/// synonym-expansion hint for the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SearchOutcome {
    Found(Vec<MatchResult>),
    Empty { suggestion: String },
}

impl SearchOutcome {
    /// Wire body for the search endpoint: `{"matches": [...]}` on hits,
    /// `{"matches": [], "sugerencia": ...}` when nothing matched. The
    /// `render` closure turns one result into its response string.
    pub fn to_body<F>(&self, render: F) -> serde_json::Value
    where
        F: Fn(&MatchResult) -> String,
    {
        match self {
            SearchOutcome::Found(results) => {
                let matches: Vec<String> = results.iter().map(render).collect();
                serde_json::json!({ "matches": matches })
            }
            SearchOutcome::Empty { suggestion } => {
                serde_json::json!({ "matches": [], "sugerencia": suggestion })
            }
        }
    }
}

/// How the source page is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// Plain HTTP GET; the response body is parsed as-is.
    Static,
    /// Headless-browser render: wait for network idleness, then read the DOM.
    Headless,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub source_url: String,
    pub render: RenderMode,
    /// Timeout for one GET attempt (network + body read).
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Extra attempts after a transport failure. Non-2xx statuses are final.
    pub retries: u32,
    /// Network-idle budget for the headless path.
    pub render_timeout_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            render: RenderMode::Static,
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            retries: 1,
            render_timeout_ms: 30_000,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Bounds the knobs to sane ranges without failing.
    pub fn sanitized(mut self) -> Self {
        self.timeout_ms = self.timeout_ms.clamp(1_000, 120_000);
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(500, 60_000);
        self.retries = self.retries.min(3);
        self.render_timeout_ms = self.render_timeout_ms.clamp(1_000, 120_000);
        self
    }

    /// Rejects configs whose source url does not parse.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.source_url)
            .map(|_| ())
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", self.source_url)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Table-row titles must be strictly longer than this.
    pub min_title_chars: usize,
    /// Free-text lines shorter than this are dropped before segmentation.
    pub min_line_chars: usize,
    /// Uppercase/space anchor runs must be at least this long...
    pub min_anchor_chars: usize,
    /// ...and at most this long.
    pub max_anchor_chars: usize,
    /// Free-text bodies must strictly exceed this.
    pub min_body_chars: usize,
    /// Bodies are stored cut to this many chars plus an ellipsis marker.
    pub max_body_chars: usize,
    /// The free-text pass runs when the tabular pass yields fewer blocks
    /// than this. 0 disables the fallback entirely.
    pub fallback_min_blocks: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_title_chars: 20,
            min_line_chars: 10,
            min_anchor_chars: 3,
            max_anchor_chars: 50,
            min_body_chars: 200,
            max_body_chars: 2000,
            fallback_min_blocks: 2,
        }
    }
}

impl ExtractConfig {
    pub fn sanitized(mut self) -> Self {
        self.min_anchor_chars = self.min_anchor_chars.clamp(1, 200);
        self.max_anchor_chars = self.max_anchor_chars.clamp(self.min_anchor_chars, 400);
        self.max_body_chars = self.max_body_chars.max(1);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Fuse-style distance cutoff: 0.0 accepts only near-exact matches,
    /// 1.0 accepts everything. Looser = more recall.
    pub threshold: f64,
    pub max_results: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: 0.4,
            max_results: 3,
        }
    }
}

impl MatchConfig {
    pub fn sanitized(mut self) -> Self {
        self.threshold = self.threshold.clamp(0.0, 1.0);
        self.max_results = self.max_results.clamp(1, 50);
        self
    }
}

/// Seam between the pipeline and page retrieval. Implementations decide how
/// a url becomes document HTML (plain GET, headless render, test fixture).
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_config_sanitize_bounds_retries_and_timeouts() {
        let cfg = FetchConfig {
            timeout_ms: 0,
            retries: 99,
            ..FetchConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.timeout_ms, 1_000);
        assert_eq!(cfg.retries, 3);
    }

    #[test]
    fn fetch_config_validate_rejects_garbage_url() {
        let cfg = FetchConfig {
            source_url: "not a url".into(),
            ..FetchConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn match_config_threshold_is_clamped_to_unit_interval() {
        let cfg = MatchConfig {
            threshold: 7.5,
            max_results: 0,
        }
        .sanitized();
        assert_eq!(cfg.threshold, 1.0);
        assert_eq!(cfg.max_results, 1);
    }

    #[test]
    fn outcome_body_carries_suggestion_only_when_empty() {
        let found = SearchOutcome::Found(vec![MatchResult {
            key: "21/2018".into(),
            title: "T".into(),
            date: None,
            summary: "T".into(),
            full: None,
        }]);
        let body = found.to_body(|m| format!("Clave: {}", m.key));
        assert_eq!(body["matches"][0], "Clave: 21/2018");
        assert!(body.get("sugerencia").is_none());

        let empty = SearchOutcome::Empty {
            suggestion: "q (intenta)".into(),
        };
        let body = empty.to_body(|_| String::new());
        assert_eq!(body["matches"].as_array().map(|a| a.len()), Some(0));
        assert_eq!(body["sugerencia"], "q (intenta)");
    }
}
