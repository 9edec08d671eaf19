//! axum surface: the search endpoint, the upstream relay endpoint, and a
//! health probe. Handlers stay thin; all pipeline work lives in
//! `jurisearch-local`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jurisearch_core::Error;
use jurisearch_local::{
    format, run_search, BlockExtractor, HttpFetcher, RelayBody, UpstreamRelay,
};

use crate::config::ServerConfig;

/// Request-independent service state, shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub fetcher: Arc<HttpFetcher>,
    pub extractor: Arc<BlockExtractor>,
    pub matching: jurisearch_core::MatchConfig,
    pub relay: Arc<UpstreamRelay>,
    pub source_url: String,
}

impl AppState {
    pub fn new(cfg: &ServerConfig) -> Result<Self, Error> {
        let fetcher = HttpFetcher::new(cfg.fetch.clone())?;
        let source_url = fetcher.config().source_url.clone();
        Ok(Self {
            fetcher: Arc::new(fetcher),
            extractor: Arc::new(BlockExtractor::new(cfg.extract.clone())),
            matching: cfg.matching.clone(),
            relay: Arc::new(UpstreamRelay::new(cfg.relay.clone())?),
            source_url,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/juris-search", post(search).fallback(only_post))
        .route("/api/relay", post(relay).fallback(only_post))
        .with_state(state)
}

/// Error wrapper that renders the taxonomy as HTTP statuses. Validation
/// messages travel verbatim (they are the user-facing contract strings);
/// everything else gets the error's display form.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::warn!(error = %self.0, "request rejected");
        }
        let message = match self.0 {
            Error::Validation(msg) => msg,
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn only_post() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(serde_json::json!({ "error": "Solo POST permitido" })),
    )
}

// JS-style truthiness for the optional full-text flag, so callers sending
// `1` or `"yes"` keep working.
fn truthy(v: &serde_json::Value) -> bool {
    match v {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        serde_json::Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = body
        .get("query")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| Error::Validation("Query requerida".to_string()))?;
    let want_full = body
        .get("full_text")
        .or_else(|| body.get("fullText"))
        .map(truthy)
        .unwrap_or(false);

    let outcome = run_search(
        state.fetcher.as_ref(),
        &state.source_url,
        &state.extractor,
        &state.matching,
        query,
        want_full,
    )
    .await?;
    Ok(Json(
        outcome.to_body(|m| format::format_match(m, &state.source_url)),
    ))
}

async fn relay(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let relayed = match body.get("target").and_then(|v| v.as_str()) {
        Some("agent") => {
            let user_id = body.get("userID").and_then(|v| v.as_str()).unwrap_or("");
            let action = body
                .get("action")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            state.relay.interact(user_id, &action).await?
        }
        Some("tts") => {
            let text = body.get("text").and_then(|v| v.as_str()).unwrap_or("");
            state.relay.speak(text).await?
        }
        _ => return Err(Error::Validation("Target no válido".to_string()).into()),
    };

    let status = StatusCode::from_u16(relayed.status)
        .map_err(|e| Error::Internal(format!("upstream status: {e}")))?;
    let body = match relayed.body {
        RelayBody::Buffered(bytes) => Body::from(bytes),
        RelayBody::Streaming(stream) => Body::from_stream(stream),
    };
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, relayed.content_type)
        .body(body)
        .map_err(|e| ApiError::from(Error::Internal(e.to_string())))
}
