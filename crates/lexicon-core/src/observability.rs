use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Filter used when neither `LEXICON_LOG_LEVEL` nor `RUST_LOG` parses.
/// Lookup crates log lifecycle events at info; dependencies (hyper, rustls,
/// reqwest) stay at warn.
pub const DEFAULT_LOG_FILTER: &str = "warn,lexicon_core=info,lexicon_stream=info,lexicon_cli=info";

const DEFAULT_JSON_LOG_FILE: &str = "lexicon.logs.jsonl";

pub(crate) fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

/// Where and how logs are written.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    enabled: bool,
    filter: String,
    /// `(directory, file name)` of the JSONL sink; stderr when `None`.
    json_sink: Option<(PathBuf, String)>,
}

impl LogSettings {
    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = get("LEXICON_OBSERVABILITY_ENABLED")
            .and_then(|v| parse_bool_env(&v))
            .unwrap_or(true);
        let filter = ["LEXICON_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(&get)
            .find(|directives| EnvFilter::try_new(directives).is_ok())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        let json_sink = get("LEXICON_JSON_LOG_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(|p| json_sink(Path::new(&p)));
        Self {
            enabled,
            filter,
            json_sink,
        }
    }
}

fn json_sink(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let file = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_LOG_FILE)
        .to_string();
    (dir, file)
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `LEXICON_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `LEXICON_LOG_LEVEL`: filter directives (`debug`, `lexicon_stream=debug`, ...).
/// - `RUST_LOG`: fallback filter; [`DEFAULT_LOG_FILTER`] when neither parses.
/// - `LEXICON_JSON_LOG_PATH`: JSONL log file. Without it logs go to stderr in
///   compact form, since stdout carries streamed entry text.
pub fn init_observability() {
    INIT.get_or_init(|| {
        let settings = LogSettings::from_vars(|key| std::env::var(key).ok());
        if !settings.enabled {
            return;
        }
        let env_filter = EnvFilter::new(&settings.filter);

        match settings.json_sink {
            Some((dir, file)) => {
                let _ = std::fs::create_dir_all(&dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(true)
                    .with_writer(tracing_appender::rolling::never(dir, file));
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn bool_env_values() {
        assert_eq!(parse_bool_env(" ON "), Some(true));
        assert_eq!(parse_bool_env("disabled"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn defaults_to_lexicon_crates_at_info() {
        let s = settings(&[]);
        assert!(s.enabled);
        assert_eq!(s.filter, DEFAULT_LOG_FILTER);
        assert!(s.filter.contains("lexicon_stream=info"));
        assert_eq!(s.json_sink, None);
    }

    #[test]
    fn lexicon_level_beats_rust_log() {
        let s = settings(&[("LEXICON_LOG_LEVEL", "lexicon_stream=debug"), ("RUST_LOG", "trace")]);
        assert_eq!(s.filter, "lexicon_stream=debug");
        assert_eq!(settings(&[("RUST_LOG", "trace")]).filter, "trace");
    }

    #[test]
    fn unparsable_filters_fall_back() {
        let s = settings(&[("LEXICON_LOG_LEVEL", "lexicon_stream=loud"), ("RUST_LOG", "hyper=noisy")]);
        assert_eq!(s.filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn json_sink_splits_directory_and_file() {
        let s = settings(&[("LEXICON_JSON_LOG_PATH", "logs/run.jsonl")]);
        assert_eq!(s.json_sink, Some((PathBuf::from("logs"), "run.jsonl".into())));
        assert_eq!(
            json_sink(Path::new("bare.jsonl")),
            (PathBuf::from("."), "bare.jsonl".into())
        );
    }

    #[test]
    fn disabled_flag_is_honoured() {
        assert!(!settings(&[("LEXICON_OBSERVABILITY_ENABLED", "off")]).enabled);
    }

    #[test]
    fn init_is_idempotent() {
        init_observability();
        init_observability();
    }
}
