//! One configurable relay to the two upstream SaaS engines.
//!
//! This used to exist as a family of hand-copied proxy handlers, one per
//! deployment, each with its own env names and its own buffered-or-streamed
//! experiment. It is now a single component: the caller picks the target per
//! request, configuration picks the delivery mode, and both targets share the
//! same timeout and retry discipline.

use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use jurisearch_core::{Error, Result};

/// How upstream bytes reach the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayMode {
    /// Read the whole upstream body, then hand it over at once.
    Buffered,
    /// Forward chunks as the upstream produces them.
    Streaming,
}

/// The upstream engines a relay request can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayTarget {
    /// Conversational agent runtime (Voiceflow-compatible).
    Agent,
    /// Text-to-speech synthesis (ElevenLabs-compatible).
    Speech,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: RelayMode,
    /// Total budget for buffered exchanges; per-read budget when streaming.
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Extra attempts on transport failure. Upstream error statuses are
    /// answers, not failures, and are never retried.
    pub retries: u32,
    pub agent_base_url: String,
    pub agent_api_key: Option<String>,
    pub agent_version: String,
    pub speech_base_url: String,
    pub speech_api_key: Option<String>,
    pub speech_voice_id: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::Streaming,
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            retries: 1,
            agent_base_url: "https://general-runtime.voiceflow.com".to_string(),
            agent_api_key: None,
            agent_version: "production".to_string(),
            speech_base_url: "https://api.elevenlabs.io".to_string(),
            speech_api_key: None,
            speech_voice_id: None,
        }
    }
}

fn env_nonempty(k: &str) -> Option<String> {
    std::env::var(k)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn agent_api_key_from_env() -> Option<String> {
    env_nonempty("JURISEARCH_AGENT_API_KEY").or_else(|| env_nonempty("VOICEFLOW_API_KEY"))
}

fn speech_api_key_from_env() -> Option<String> {
    env_nonempty("JURISEARCH_SPEECH_API_KEY").or_else(|| env_nonempty("ELEVENLABS_API_KEY"))
}

fn speech_voice_id_from_env() -> Option<String> {
    env_nonempty("JURISEARCH_SPEECH_VOICE_ID").or_else(|| env_nonempty("ELEVENLABS_VOICE_ID"))
}

impl RelayConfig {
    /// Reads the relay knobs from the environment. Missing keys are allowed
    /// here; they only fail the specific target that needs them, at call time.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = match env_nonempty("JURISEARCH_RELAY_MODE").as_deref() {
            Some("buffered") => RelayMode::Buffered,
            Some("streaming") => RelayMode::Streaming,
            _ => defaults.mode,
        };
        Self {
            mode,
            timeout_ms: env_nonempty("JURISEARCH_RELAY_TIMEOUT_MS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            connect_timeout_ms: defaults.connect_timeout_ms,
            retries: env_nonempty("JURISEARCH_RELAY_RETRIES")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retries),
            agent_base_url: env_nonempty("JURISEARCH_AGENT_BASE_URL")
                .unwrap_or(defaults.agent_base_url),
            agent_api_key: agent_api_key_from_env(),
            agent_version: env_nonempty("JURISEARCH_AGENT_VERSION")
                .unwrap_or(defaults.agent_version),
            speech_base_url: env_nonempty("JURISEARCH_SPEECH_BASE_URL")
                .unwrap_or(defaults.speech_base_url),
            speech_api_key: speech_api_key_from_env(),
            speech_voice_id: speech_voice_id_from_env(),
        }
    }
}

/// Relayed upstream body, shaped by [`RelayMode`].
pub enum RelayBody {
    Buffered(Vec<u8>),
    Streaming(BoxStream<'static, Result<Vec<u8>>>),
}

impl std::fmt::Debug for RelayBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(bytes).finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// A successful upstream exchange: 2xx status, content type, body.
#[derive(Debug)]
pub struct RelayResponse {
    pub status: u16,
    pub content_type: String,
    pub body: RelayBody,
}

pub struct UpstreamRelay {
    client: reqwest::Client,
    cfg: RelayConfig,
}

impl UpstreamRelay {
    pub fn new(cfg: RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("jurisearch-local/0.1")
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .read_timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Internal(format!("relay client: {e}")))?;
        Ok(Self { client, cfg })
    }

    pub fn mode(&self) -> RelayMode {
        self.cfg.mode
    }

    /// Forwards one conversational turn to the agent runtime.
    pub async fn interact(
        &self,
        user_id: &str,
        action: &serde_json::Value,
    ) -> Result<RelayResponse> {
        let key = self.cfg.agent_api_key.as_deref().ok_or_else(|| {
            Error::NotConfigured(
                "missing JURISEARCH_AGENT_API_KEY (or VOICEFLOW_API_KEY)".to_string(),
            )
        })?;
        if user_id.trim().is_empty() {
            return Err(Error::Validation("userID requerido".to_string()));
        }
        let url = format!(
            "{}/state/user/{}/interact",
            self.cfg.agent_base_url.trim_end_matches('/'),
            user_id
        );
        let req = self
            .client
            .post(&url)
            .header("Authorization", key)
            .header("versionID", &self.cfg.agent_version)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&serde_json::json!({ "action": action }));
        self.relay(req, "text/event-stream").await
    }

    /// Synthesizes speech for the given text.
    pub async fn speak(&self, text: &str) -> Result<RelayResponse> {
        let key = self.cfg.speech_api_key.as_deref().ok_or_else(|| {
            Error::NotConfigured(
                "missing JURISEARCH_SPEECH_API_KEY (or ELEVENLABS_API_KEY)".to_string(),
            )
        })?;
        let voice = self.cfg.speech_voice_id.as_deref().ok_or_else(|| {
            Error::NotConfigured(
                "missing JURISEARCH_SPEECH_VOICE_ID (or ELEVENLABS_VOICE_ID)".to_string(),
            )
        })?;
        if text.trim().is_empty() {
            return Err(Error::Validation("text requerido".to_string()));
        }
        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.cfg.speech_base_url.trim_end_matches('/'),
            voice
        );
        let req = self
            .client
            .post(&url)
            .header("xi-api-key", key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&serde_json::json!({
                "text": text,
                "model_id": "eleven_multilingual_v2",
                "voice_settings": { "stability": 0.5, "similarity_boost": 0.75 }
            }));
        self.relay(req, "audio/mpeg").await
    }

    async fn relay(
        &self,
        req: reqwest::RequestBuilder,
        fallback_content_type: &str,
    ) -> Result<RelayResponse> {
        let req = match self.cfg.mode {
            // Buffered exchanges get a whole-request budget on top of the
            // per-read one; streams must be allowed to outlive it.
            RelayMode::Buffered => req.timeout(Duration::from_millis(self.cfg.timeout_ms)),
            RelayMode::Streaming => req,
        };
        let resp = crate::send_with_retry(req, self.cfg.retries).await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(Error::Upstream {
                status: status.as_u16(),
                detail,
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(fallback_content_type)
            .to_string();
        let status = status.as_u16();
        let body = match self.cfg.mode {
            RelayMode::Buffered => RelayBody::Buffered(
                resp.bytes()
                    .await
                    .map_err(|e| Error::Fetch(format!("relay body: {e}")))?
                    .to_vec(),
            ),
            RelayMode::Streaming => {
                let stream = resp.bytes_stream().map(|chunk| {
                    chunk
                        .map(|b| b.to_vec())
                        .map_err(|e| Error::Fetch(format!("relay stream: {e}")))
                });
                RelayBody::Streaming(Box::pin(stream))
            }
        };
        Ok(RelayResponse {
            status,
            content_type,
            body,
        })
    }
}
