use lexicon_core::ConfigError;

use crate::utf8::DecodeError;

/// Terminal failure of a lookup stream, delivered to the caller as the last item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamFailure {
    /// Upstream bytes were not valid UTF-8 or ended mid code point.
    #[error("decode failure: {message}")]
    Decode { message: String },
    /// The vendor sent an `error` event or rejected the request.
    #[error("upstream failure: {message}")]
    Upstream {
        message: String,
        status_code: Option<u16>,
    },
    /// Network or stream I/O failed.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// The caller aborted or went away.
    #[error("lookup cancelled")]
    Cancelled,
}

impl StreamFailure {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

impl From<DecodeError> for StreamFailure {
    fn from(value: DecodeError) -> Self {
        Self::Decode {
            message: value.to_string(),
        }
    }
}

/// Top-level error type for the public lookup API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// Invalid streamer or upstream configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Invalid lookup request.
    #[error("validation error: {0}")]
    Validation(String),
    /// The stream ended with a terminal failure.
    #[error(transparent)]
    Failed(#[from] StreamFailure),
    /// Internal misuse, e.g. the stream task vanished without an outcome.
    #[error("protocol error: {0}")]
    Protocol(String),
}
