use std::time::{Duration, Instant};

use tracing::{info, warn};

use lexicon_core::{LearnerContext, PersistRequest, RecordId, UserId};

use crate::errors::StreamFailure;
use crate::request::LookupRequest;
use crate::sentinel::{self, SentinelCheck};

/// Diagnostic snapshot of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub elapsed: Duration,
    pub total_chars: usize,
    pub chunk_count: u64,
    pub sentinel: SentinelCheck,
    pub error: Option<StreamFailure>,
}

/// Per-request accumulator owned by the stream task.
///
/// Consumed by value by the finalizer; never shared.
#[derive(Debug)]
pub struct StreamingSession {
    request_id: uuid::Uuid,
    user_id: Option<UserId>,
    record_id: Option<RecordId>,
    capture_history: bool,
    term: String,
    language: String,
    flavor: String,
    model: String,
    learner: Option<LearnerContext>,
    transcript: String,
    chunk_count: u64,
    started_at: Instant,
    error: Option<StreamFailure>,
    summary: Option<SessionSummary>,
}

impl StreamingSession {
    pub fn new(request_id: uuid::Uuid, request: &LookupRequest, model: impl Into<String>) -> Self {
        Self {
            request_id,
            user_id: request.user_id,
            record_id: request.record_id,
            capture_history: request.capture_history,
            term: request.term.clone(),
            language: request.language.clone(),
            flavor: request.flavor.clone(),
            model: model.into(),
            learner: request.learner.clone(),
            transcript: String::new(),
            chunk_count: 0,
            started_at: Instant::now(),
            error: None,
            summary: None,
        }
    }

    pub fn request_id(&self) -> uuid::Uuid {
        self.request_id
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn chunk_count(&self) -> u64 {
        self.chunk_count
    }

    pub fn error(&self) -> Option<&StreamFailure> {
        self.error.as_ref()
    }

    pub fn append(&mut self, fragment: &str) {
        self.transcript.push_str(fragment);
        self.chunk_count += 1;
        self.summary = None;
    }

    /// Records the first terminal failure; later causes are ignored.
    pub fn mark_error(&mut self, cause: StreamFailure) {
        if self.error.is_none() {
            self.error = Some(cause);
            self.summary = None;
        }
    }

    /// Computes (once) and logs the session summary.
    pub fn summarize(&mut self) -> &SessionSummary {
        let summary = self.summary.get_or_insert_with(|| SessionSummary {
            elapsed: self.started_at.elapsed(),
            total_chars: self.transcript.chars().count(),
            chunk_count: self.chunk_count,
            sentinel: sentinel::detect(&self.transcript),
            error: self.error.clone(),
        });
        let elapsed_ms = summary.elapsed.as_millis() as u64;
        if let Some(error) = &summary.error {
            warn!(
                event = "stream.session_failed",
                domain = "stream",
                request_id = %self.request_id,
                term = self.term.as_str(),
                model = self.model.as_str(),
                chunks = summary.chunk_count,
                chars = summary.total_chars as u64,
                elapsed_ms,
                error = %error
            );
        } else if summary.sentinel.satisfied {
            info!(
                event = "stream.session_completed",
                domain = "stream",
                request_id = %self.request_id,
                term = self.term.as_str(),
                model = self.model.as_str(),
                chunks = summary.chunk_count,
                chars = summary.total_chars as u64,
                elapsed_ms
            );
        } else {
            warn!(
                event = "stream.session_incomplete",
                domain = "stream",
                request_id = %self.request_id,
                term = self.term.as_str(),
                model = self.model.as_str(),
                chunks = summary.chunk_count,
                chars = summary.total_chars as u64,
                elapsed_ms
            );
        }
        summary
    }

    /// Persistence inputs derived from this session.
    pub fn persist_request(&self) -> PersistRequest {
        PersistRequest {
            user_id: self.user_id,
            record_id: self.record_id,
            capture_history: self.capture_history,
            term: self.term.clone(),
            language: self.language.clone(),
            flavor: self.flavor.clone(),
            model: self.model.clone(),
            learner: self.learner.clone(),
        }
    }
}
