use async_trait::async_trait;
use futures::StreamExt as _;
use tracing::debug;

use lexicon_core::{ConfigError, LexiconConfig};

use super::{ByteStream, UpstreamSource, prompt};
use crate::errors::StreamFailure;
use crate::request::LookupRequest;

/// OpenAI-compatible chat-completions streaming over HTTP.
pub struct HttpUpstream {
    client: reqwest::Client,
    config: LexiconConfig,
    api_key: String,
}

impl HttpUpstream {
    /// Builds the client. Fails when no API key is configured.
    pub fn new(config: LexiconConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let api_key = config.require_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "LEXICON_UPSTREAM_URL",
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(LexiconConfig::from_env()?)
    }
}

pub(crate) fn build_request_body(request: &LookupRequest, default_model: &str) -> serde_json::Value {
    let model = request.model.as_deref().unwrap_or(default_model);
    serde_json::json!({
        "model": model,
        "stream": true,
        "messages": [
            {
                "role": "system",
                "content": prompt::system_prompt(&request.language, &request.flavor),
            },
            {
                "role": "user",
                "content": prompt::user_prompt(request),
            },
        ],
    })
}

#[async_trait]
impl UpstreamSource for HttpUpstream {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(&self, request: &LookupRequest) -> Result<ByteStream, StreamFailure> {
        let body = build_request_body(request, &self.config.model);
        let url = self.config.chat_completions_url();
        debug!(
            event = "upstream.request",
            domain = "stream",
            url = url.as_str(),
            model = body["model"].as_str().unwrap_or_default(),
            term = request.term.as_str()
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| StreamFailure::transport(format!("upstream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(StreamFailure::Upstream {
                message: format!("upstream request failed with status {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }

        let stream = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| StreamFailure::transport(format!("upstream read failed: {e}")))
        });
        Ok(Box::pin(stream))
    }
}
