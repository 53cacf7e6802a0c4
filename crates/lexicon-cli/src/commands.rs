use std::error::Error;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use lexicon_core::personalize::LearnerNotePersonalizer;
use lexicon_core::store::{InMemorySearchService, InMemoryWordCache};
use lexicon_core::{LearnerContext, LexiconConfig, UserId, WordPersistenceCoordinator};
use lexicon_stream::prelude::*;
use lexicon_stream::encode_sse;

/// Local user that owns every search record created by the CLI.
const CLI_USER: UserId = UserId(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Entry text only.
    Text,
    /// Every caller item as an SSE block.
    Sse,
}

#[derive(Clone, Debug)]
pub struct LookupOptions {
    pub term: String,
    pub language: String,
    pub flavor: String,
    pub model: Option<String>,
    pub capture_history: bool,
    pub native_language: Option<String>,
    pub level: Option<String>,
    pub interests: Vec<String>,
    pub format: OutputFormat,
}

impl LookupOptions {
    fn learner(&self) -> Option<LearnerContext> {
        let context = LearnerContext {
            native_language: self.native_language.clone(),
            level: self.level.clone(),
            interests: self.interests.clone(),
        };
        (!context.is_empty()).then_some(context)
    }

    fn request(&self, search: &InMemorySearchService) -> LookupRequest {
        let mut request = LookupRequest::new(self.term.clone())
            .language(self.language.clone())
            .flavor(self.flavor.clone());
        if let Some(model) = &self.model {
            request = request.model(model.clone());
        }
        if let Some(learner) = self.learner() {
            request = request.learner(learner);
        }
        if self.capture_history {
            let record = search.create_record(CLI_USER, &self.term, &self.language, &self.flavor);
            request = request.history(CLI_USER, record.id);
        }
        request
    }
}

/// Streams a live lookup and returns a one-line summary of the outcome.
pub async fn lookup(
    config: &LexiconConfig,
    options: LookupOptions,
    out: &mut impl Write,
) -> Result<String, Box<dyn Error>> {
    let upstream = HttpUpstream::new(config.clone())?;
    run(config, Arc::new(upstream), options, out).await
}

/// Streams a recorded capture cut into `chunk_size`-byte chunks.
pub async fn replay(
    config: &LexiconConfig,
    capture: &Path,
    chunk_size: usize,
    options: LookupOptions,
    out: &mut impl Write,
) -> Result<String, Box<dyn Error>> {
    let bytes = tokio::fs::read(capture)
        .await
        .map_err(|e| format!("failed to read capture {}: {e}", capture.display()))?;
    info!(
        event = "cli.replay_loaded",
        domain = "cli",
        path = %capture.display(),
        bytes = bytes.len() as u64,
        chunk_size = chunk_size as u64
    );
    run(config, Arc::new(ReplayUpstream::new(bytes, chunk_size)), options, out).await
}

async fn run(
    config: &LexiconConfig,
    upstream: Arc<dyn UpstreamSource>,
    options: LookupOptions,
    out: &mut impl Write,
) -> Result<String, Box<dyn Error>> {
    let search = Arc::new(InMemorySearchService::new());
    let coordinator = WordPersistenceCoordinator::new(
        Arc::new(InMemoryWordCache::new()),
        search.clone(),
    )
    .with_personalizer(Arc::new(LearnerNotePersonalizer));
    let streamer = LookupStreamer::builder()
        .config(config)
        .upstream(upstream)
        .coordinator(Arc::new(coordinator))
        .build()?;

    let mut stream = streamer.start(options.request(&search)).await?;
    while let Some(item) = stream.next_item().await {
        match options.format {
            OutputFormat::Text => {
                if let StreamItem::Text { text, .. } = &item {
                    out.write_all(text.as_bytes())?;
                    out.flush()?;
                }
            }
            OutputFormat::Sse => out.write_all(encode_sse(&item).as_bytes())?,
        }
    }
    if options.format == OutputFormat::Text {
        writeln!(out)?;
    }
    out.flush()?;

    let outcome = stream.finish().await?;
    Ok(describe(&outcome))
}

fn describe(outcome: &StreamOutcome) -> String {
    match outcome {
        StreamOutcome::Persisted {
            version_id,
            response,
        } => match &response.personal_note {
            Some(note) => format!("saved as version {version_id}\n{note}"),
            None => format!("saved as version {version_id}"),
        },
        StreamOutcome::NotPersisted { reason } => format!("not saved: {reason}"),
        StreamOutcome::Incomplete => "incomplete: no completion marker, nothing saved".into(),
        StreamOutcome::Errored(failure) => format!("failed: {failure}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> String {
        format!("data: {{\"choices\":[{{\"delta\":{{\"content\":{text:?}}}}}]}}\n\n")
    }

    fn capture(parts: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        for part in parts {
            file.write_all(delta(part).as_bytes()).expect("write");
        }
        file.write_all(b"data: [DONE]\n\n").expect("write");
        file.flush().expect("flush");
        file
    }

    fn options(format: OutputFormat) -> LookupOptions {
        LookupOptions {
            term: "tree".into(),
            language: "en".into(),
            flavor: "standard".into(),
            model: None,
            capture_history: true,
            native_language: None,
            level: None,
            interests: Vec::new(),
            format,
        }
    }

    #[tokio::test]
    async fn replay_prints_text_and_reports_version() {
        let file = capture(&["# tree\n\n## Defin", "itions\n1. A woody plant.\n", "<END>\n"]);
        let mut out = Vec::new();
        let summary = replay(
            &LexiconConfig::default(),
            file.path(),
            3,
            options(OutputFormat::Text),
            &mut out,
        )
        .await
        .expect("replay");
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "# tree\n\n## Definitions\n1. A woody plant.\n\n"
        );
        assert_eq!(summary, "saved as version 1");
    }

    #[tokio::test]
    async fn replay_sse_output_ends_with_version_event() {
        let file = capture(&["# tree\n\n## Definitions\n1. A woody plant.\n<END>"]);
        let mut out = Vec::new();
        replay(
            &LexiconConfig::default(),
            file.path(),
            5,
            options(OutputFormat::Sse),
            &mut out,
        )
        .await
        .expect("replay");
        let wire = String::from_utf8(out).expect("utf8");
        assert!(wire.starts_with("event: message\n"));
        assert!(wire.ends_with("event: version\ndata: 1\n\n"));
    }

    #[tokio::test]
    async fn replay_without_history_is_not_versioned() {
        let file = capture(&["# tree\n\n## Definitions\n1. A woody plant.\n<END>"]);
        let mut opts = options(OutputFormat::Text);
        opts.capture_history = false;
        let summary = replay(&LexiconConfig::default(), file.path(), 64, opts, &mut Vec::new())
            .await
            .expect("replay");
        assert_eq!(summary, "not saved: history capture not requested");
    }

    #[tokio::test]
    async fn replay_with_learner_appends_personal_note() {
        let file = capture(&["# tree\n\n## Definitions\n1. A woody plant.\n<END>"]);
        let mut opts = options(OutputFormat::Text);
        opts.level = Some("A2".into());
        let summary = replay(&LexiconConfig::default(), file.path(), 16, opts, &mut Vec::new())
            .await
            .expect("replay");
        assert!(summary.starts_with("saved as version 1\n"));
        assert!(summary.contains("A2"));
    }

    #[tokio::test]
    async fn replay_of_missing_file_fails() {
        let result = replay(
            &LexiconConfig::default(),
            Path::new("/definitely/not/here.sse"),
            4,
            options(OutputFormat::Text),
            &mut Vec::new(),
        )
        .await;
        let err = result.expect_err("missing file");
        assert!(err.to_string().contains("failed to read capture"));
    }
}
