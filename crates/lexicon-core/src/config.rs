use std::time::Duration;

use crate::errors::ConfigError;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STREAM_BUFFER: usize = 128;

/// Loads `.env` from the working directory if present. Missing files are fine.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Runtime settings for lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexiconConfig {
    /// Base URL of the OpenAI-compatible upstream.
    pub upstream_url: String,
    /// Bearer token; required only for live upstream lookups.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Bounded buffer between the stream task and the caller.
    pub stream_buffer_capacity: usize,
}

impl Default for LexiconConfig {
    fn default() -> Self {
        Self {
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER,
        }
    }
}

impl LexiconConfig {
    /// Builds a config from `LEXICON_*` environment variables.
    ///
    /// - `LEXICON_UPSTREAM_URL`
    /// - `LEXICON_API_KEY` (falls back to `OPENAI_API_KEY`)
    /// - `LEXICON_MODEL`
    /// - `LEXICON_TIMEOUT_SECS`
    /// - `LEXICON_STREAM_BUFFER`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();
        if let Some(url) = var("LEXICON_UPSTREAM_URL") {
            config.upstream_url = url;
        }
        config.api_key = var("LEXICON_API_KEY").or_else(|| var("OPENAI_API_KEY"));
        if let Some(model) = var("LEXICON_MODEL") {
            config.model = model;
        }
        if let Some(raw) = var("LEXICON_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "LEXICON_TIMEOUT_SECS",
                message: format!("expected whole seconds, got {raw:?}"),
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = var("LEXICON_STREAM_BUFFER") {
            config.stream_buffer_capacity = raw.parse().map_err(|_| ConfigError::Invalid {
                key: "LEXICON_STREAM_BUFFER",
                message: format!("expected a positive integer, got {raw:?}"),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_buffer_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "LEXICON_STREAM_BUFFER",
                message: "must be greater than 0".into(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("LEXICON_MODEL"));
        }
        Ok(())
    }

    /// Returns the API key or a `Missing` error.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("LEXICON_API_KEY"))
    }

    pub fn upstream_url(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Chat-completions endpoint derived from `upstream_url`.
    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.upstream_url.trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = LexiconConfig::from_vars(vars(&[])).expect("config");
        assert_eq!(config, LexiconConfig::default());
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn reads_overrides_and_openai_fallback_key() {
        let config = LexiconConfig::from_vars(vars(&[
            ("LEXICON_UPSTREAM_URL", "http://localhost:8080/"),
            ("OPENAI_API_KEY", "sk-test"),
            ("LEXICON_MODEL", "tiny"),
            ("LEXICON_TIMEOUT_SECS", "5"),
            ("LEXICON_STREAM_BUFFER", "8"),
        ]))
        .expect("config");
        assert_eq!(config.require_api_key().expect("key"), "sk-test");
        assert_eq!(config.model, "tiny");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.stream_buffer_capacity, 8);
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn rejects_bad_numbers_and_zero_buffer() {
        let err = LexiconConfig::from_vars(vars(&[("LEXICON_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LEXICON_TIMEOUT_SECS", .. }));
        let err = LexiconConfig::from_vars(vars(&[("LEXICON_STREAM_BUFFER", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "LEXICON_STREAM_BUFFER", .. }));
    }
}
