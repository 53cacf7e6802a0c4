use std::sync::Arc;

use tracing::{info, warn};

use lexicon_core::{
    LookupResponse, ParsedEntry, VersionContent, VersionId, WordPersistenceCoordinator,
};

use crate::errors::StreamFailure;
use crate::session::StreamingSession;

/// How a finished stream was settled.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamOutcome {
    /// Entry parsed, saved, and snapshotted as `version_id`.
    Persisted {
        version_id: VersionId,
        response: Box<LookupResponse>,
    },
    /// Completed with the marker but nothing versioned; see `reason`.
    NotPersisted { reason: String },
    /// Transport completed without the completion marker.
    Incomplete,
    /// The stream failed; persistence was never attempted.
    Errored(StreamFailure),
}

impl StreamOutcome {
    pub fn version_id(&self) -> Option<VersionId> {
        match self {
            Self::Persisted { version_id, .. } => Some(*version_id),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Persisted { .. } => "persisted",
            Self::NotPersisted { .. } => "not_persisted",
            Self::Incomplete => "incomplete",
            Self::Errored(_) => "errored",
        }
    }
}

/// Settles a session once its transport has ended.
pub struct StreamFinalizer {
    coordinator: Arc<WordPersistenceCoordinator>,
}

impl StreamFinalizer {
    pub fn new(coordinator: Arc<WordPersistenceCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Consumes the session. Parse and persistence failures are logged and
    /// reported as [`StreamOutcome::NotPersisted`]; they never surface as errors.
    pub async fn finalize(&self, mut session: StreamingSession) -> StreamOutcome {
        let summary = session.summarize().clone();
        let request_id = session.request_id();

        if let Some(failure) = summary.error {
            return StreamOutcome::Errored(failure);
        }
        if !summary.sentinel.satisfied {
            warn!(
                event = "finalize.skipped_incomplete",
                domain = "stream",
                request_id = %request_id,
                term = session.term(),
                chars = summary.total_chars as u64
            );
            return StreamOutcome::Incomplete;
        }

        let sanitized = summary.sentinel.sanitized;
        let entry = match ParsedEntry::parse_transcript(&sanitized, session.term()) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(
                    event = "finalize.parse_failed",
                    domain = "stream",
                    request_id = %request_id,
                    term = session.term(),
                    error = %err
                );
                return StreamOutcome::NotPersisted {
                    reason: format!("entry parse failed: {err}"),
                };
            }
        };

        let request = session.persist_request();
        let content = VersionContent::SanitizedTranscript(sanitized.clone());
        let response = match self
            .coordinator
            .persist(&request, entry, sanitized, content)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(
                    event = "finalize.persist_failed",
                    domain = "stream",
                    request_id = %request_id,
                    term = session.term(),
                    error = %err
                );
                return StreamOutcome::NotPersisted {
                    reason: format!("persistence failed: {err}"),
                };
            }
        };

        match response.version_id {
            Some(version_id) => {
                info!(
                    event = "finalize.persisted",
                    domain = "stream",
                    request_id = %request_id,
                    term = session.term(),
                    version_id = %version_id
                );
                StreamOutcome::Persisted {
                    version_id,
                    response: Box::new(response),
                }
            }
            None => {
                let reason = if request.history_target().is_some() {
                    "version write failed"
                } else {
                    "history capture not requested"
                };
                info!(
                    event = "finalize.unversioned",
                    domain = "stream",
                    request_id = %request_id,
                    term = session.term(),
                    reason
                );
                StreamOutcome::NotPersisted {
                    reason: reason.to_string(),
                }
            }
        }
    }
}
