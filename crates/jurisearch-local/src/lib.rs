use std::time::Duration;

use jurisearch_core::{
    Error, FetchConfig, MatchConfig, PageFetcher, RenderMode, Result, SearchOutcome,
};

pub mod extract;
pub mod format;
pub mod matcher;
pub mod relay;
pub mod render;
pub mod textnorm;
pub mod variants;

pub use extract::BlockExtractor;
pub use relay::{RelayBody, RelayConfig, RelayMode, RelayResponse, RelayTarget, UpstreamRelay};
pub use render::RenderedPage;

/// Fetches the compilation page: plain HTTP GET, or the headless render
/// backend when the listing is built client-side.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    cfg: FetchConfig,
}

impl HttpFetcher {
    pub fn new(cfg: FetchConfig) -> Result<Self> {
        let cfg = cfg.sanitized();
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .user_agent("jurisearch-local/0.1")
            .redirect(reqwest::redirect::Policy::limited(10))
            // Safety defaults: avoid "hang forever" on DNS/TLS/body stalls.
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(cfg.timeout())
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;
        Ok(Self { client, cfg })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.cfg
    }

    async fn fetch_static(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let resp = send_with_retry(self.client.get(parsed), self.cfg.retries).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        resp.text().await.map_err(|e| Error::Fetch(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        match self.cfg.render {
            RenderMode::Static => self.fetch_static(url).await,
            RenderMode::Headless => {
                let page = render::render_page(url, self.cfg.render_timeout_ms).await?;
                Ok(page.html)
            }
        }
    }
}

const RETRY_PAUSE: Duration = Duration::from_millis(150);

/// Sends a request, allowing up to `retries` extra attempts on transport
/// failure. An error status from the other side is an answer, not a
/// failure, and passes through untouched. Requests whose body cannot be
/// cloned get exactly one attempt.
pub(crate) async fn send_with_retry(
    req: reqwest::RequestBuilder,
    retries: u32,
) -> Result<reqwest::Response> {
    let mut attempt: u32 = 0;
    loop {
        let Some(this_try) = req.try_clone() else {
            return req.send().await.map_err(|e| Error::Fetch(e.to_string()));
        };
        match this_try.send().await {
            Ok(resp) => return Ok(resp),
            Err(e) if attempt < retries && is_transient(&e) => {
                attempt += 1;
                tokio::time::sleep(RETRY_PAUSE).await;
            }
            Err(e) => return Err(Error::Fetch(e.to_string())),
        }
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    // Builder misuse and redirect loops do not get better on a second try.
    if e.is_builder() || e.is_redirect() {
        return false;
    }
    e.is_timeout() || e.is_connect() || e.is_request()
}

/// One request-scoped search pass: fetch the compilation page, extract the
/// corpus, expand the query, match. Nothing is shared between passes and
/// nothing is synthesized: a page that yields no corpus is an error.
pub async fn run_search(
    fetcher: &dyn PageFetcher,
    source_url: &str,
    extractor: &BlockExtractor,
    match_cfg: &MatchConfig,
    query: &str,
    want_full: bool,
) -> Result<SearchOutcome> {
    let html = fetcher.fetch_page(source_url).await?;
    let blocks = extractor.extract(&html)?;
    Ok(matcher::search_outcome(&blocks, query, want_full, match_cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use jurisearch_core::ExtractConfig;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    // Env vars are process-global; serialize tests that mutate them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    async fn spawn(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn quick_config() -> FetchConfig {
        FetchConfig {
            timeout_ms: 2_000,
            connect_timeout_ms: 1_000,
            retries: 1,
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn static_fetch_returns_the_page_body() {
        let addr = spawn(Router::new().route(
            "/compilacion",
            get(|| async { "<html><body>listado de tesis</body></html>" }),
        ))
        .await;

        let fetcher = HttpFetcher::new(quick_config()).unwrap();
        let html = fetcher
            .fetch_page(&format!("http://{addr}/compilacion"))
            .await
            .unwrap();
        assert!(html.contains("listado de tesis"));
    }

    #[tokio::test]
    async fn error_statuses_are_answers_not_retries() {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let addr = spawn(Router::new().route(
            "/",
            get(move || {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::INTERNAL_SERVER_ERROR, "se rompio")
                }
            }),
        ))
        .await;

        let fetcher = HttpFetcher::new(quick_config()).unwrap();
        let err = fetcher
            .fetch_page(&format!("http://{addr}/"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::HttpStatus { status: 500, .. }),
            "got {err:?}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1, "no retry on status errors");
    }

    // Drops the first connection cold, answers every later one.
    async fn flaky_server() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (first, _) = listener.accept().await.unwrap();
            drop(first);
            loop {
                let (mut sock, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    use tokio::io::{AsyncReadExt, AsyncWriteExt};
                    let mut buf = [0u8; 1024];
                    let _ = sock.read(&mut buf).await;
                    let body = b"<html><body>ok despues del reintento</body></html>";
                    let head = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = sock.write_all(head.as_bytes()).await;
                    let _ = sock.write_all(body).await;
                    let _ = sock.shutdown().await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn transport_failures_get_one_more_attempt() {
        let addr = flaky_server().await;
        let fetcher = HttpFetcher::new(quick_config()).unwrap();
        let html = fetcher.fetch_page(&format!("http://{addr}/")).await.unwrap();
        assert!(html.contains("ok despues del reintento"));
    }

    #[tokio::test]
    async fn retries_can_be_disabled() {
        let addr = flaky_server().await;
        let fetcher = HttpFetcher::new(FetchConfig {
            retries: 0,
            ..quick_config()
        })
        .unwrap();
        let err = fetcher
            .fetch_page(&format!("http://{addr}/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(_)), "got {err:?}");
    }

    #[test]
    fn bad_source_urls_fail_at_construction_time() {
        let err = HttpFetcher::new(FetchConfig {
            source_url: "no es una url".to_string(),
            ..FetchConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)), "got {err:?}");
    }

    #[tokio::test]
    #[allow(clippy::await_holding_lock)]
    async fn disabled_render_backend_is_not_configured() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::set_var("JURISEARCH_RENDER_DISABLE", "1");

        let fetcher = HttpFetcher::new(FetchConfig {
            render: RenderMode::Headless,
            ..quick_config()
        })
        .unwrap();
        let err = fetcher
            .fetch_page("http://127.0.0.1:9/compilacion")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)), "got {err:?}");

        std::env::remove_var("JURISEARCH_RENDER_DISABLE");
    }

    struct PageFixture(String);

    #[async_trait::async_trait]
    impl PageFetcher for PageFixture {
        async fn fetch_page(&self, _url: &str) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    fn listing_page() -> String {
        r#"<table>
          <tr><td>1</td><td>VIOLENCIA POLITICA DE GENERO. ELEMENTOS QUE LA ACTUALIZAN</td><td>21/2018</td><td>3 de agosto de 2018</td></tr>
          <tr><td>2</td><td>DERECHO A SER VOTADO. ALCANCES FRENTE A REQUISITOS LEGALES</td><td>11/2021</td><td>14 de abril de 2021</td></tr>
        </table>"#
            .to_string()
    }

    #[tokio::test]
    async fn search_pass_finds_matching_theses() {
        let fetcher = PageFixture(listing_page());
        let extractor = BlockExtractor::new(ExtractConfig::default());
        let outcome = run_search(
            &fetcher,
            "https://example.test/compilacion",
            &extractor,
            &MatchConfig::default(),
            "violencia política de género",
            true,
        )
        .await
        .unwrap();

        let SearchOutcome::Found(results) = outcome else {
            panic!("expected results, got {outcome:?}");
        };
        assert_eq!(results[0].key, "21/2018");
        assert!(results[0].full.as_deref().unwrap().contains("21/2018"));
    }

    #[tokio::test]
    async fn search_pass_suggests_synonyms_when_nothing_matches() {
        let fetcher = PageFixture(listing_page());
        let extractor = BlockExtractor::new(ExtractConfig::default());
        let outcome = run_search(
            &fetcher,
            "https://example.test/compilacion",
            &extractor,
            &MatchConfig::default(),
            "zzzz qqqq",
            false,
        )
        .await
        .unwrap();

        let SearchOutcome::Empty { suggestion } = outcome else {
            panic!("expected empty outcome, got {outcome:?}");
        };
        assert!(suggestion.starts_with("zzzz qqqq (intenta"), "got {suggestion:?}");
    }

    #[tokio::test]
    async fn pages_without_a_corpus_error_instead_of_inventing_one() {
        let fetcher = PageFixture("<html><body><p>mantenimiento</p></body></html>".to_string());
        let extractor = BlockExtractor::new(ExtractConfig::default());
        let err = run_search(
            &fetcher,
            "https://example.test/compilacion",
            &extractor,
            &MatchConfig::default(),
            "violencia política",
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Extract(_)), "got {err:?}");
    }
}
