//! Word persistence hand-off shared by the streaming and one-shot lookup paths.
//!
//! The pipeline is fixed: save the cached word, synchronize the search record,
//! write a version snapshot, personalize. Only the first step is fatal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::entry::ParsedEntry;
use crate::errors::PersistError;
use crate::model::{
    LearnerContext, LookupResponse, RecordId, UserId, VersionId, Word, WordKey,
};
use crate::personalize::NoopPersonalizer;
use crate::store::{Personalizer, SearchService, WordCache};

/// Where the text of a version snapshot comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "text", rename_all = "snake_case")]
pub enum VersionContent {
    /// The raw model markdown carried by the response (one-shot lookups).
    ResponseMarkdown,
    /// The structured entry rendered back to canonical markdown.
    StructuredEntry,
    /// The streaming transcript with the completion marker removed.
    SanitizedTranscript(String),
}

impl VersionContent {
    pub fn resolve(&self, response: &LookupResponse) -> String {
        match self {
            Self::ResponseMarkdown => response.markdown.clone(),
            Self::StructuredEntry => response.entry.to_markdown(),
            Self::SanitizedTranscript(text) => text.clone(),
        }
    }
}

/// Per-lookup inputs to the hand-off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistRequest {
    pub user_id: Option<UserId>,
    pub record_id: Option<RecordId>,
    /// False for anonymous or force-new lookups that must not touch history.
    pub capture_history: bool,
    pub term: String,
    pub language: String,
    pub flavor: String,
    pub model: String,
    pub learner: Option<LearnerContext>,
}

impl PersistRequest {
    pub fn key(&self) -> WordKey {
        WordKey::new(&self.term, self.language.clone(), self.flavor.clone())
    }

    /// Record sync and version write target, when history is captured.
    pub fn history_target(&self) -> Option<(UserId, RecordId)> {
        if !self.capture_history {
            return None;
        }
        Some((self.user_id?, self.record_id?))
    }
}

/// Runs the four persistence steps against injected collaborators.
pub struct WordPersistenceCoordinator {
    words: Arc<dyn WordCache>,
    search: Arc<dyn SearchService>,
    personalizer: Arc<dyn Personalizer>,
}

impl WordPersistenceCoordinator {
    pub fn new(words: Arc<dyn WordCache>, search: Arc<dyn SearchService>) -> Self {
        Self {
            words,
            search,
            personalizer: Arc::new(NoopPersonalizer),
        }
    }

    pub fn with_personalizer(mut self, personalizer: Arc<dyn Personalizer>) -> Self {
        self.personalizer = personalizer;
        self
    }

    /// Persists a parsed entry and returns the (possibly decorated) response.
    ///
    /// `response.version_id` is set only when a version snapshot was written.
    pub async fn persist(
        &self,
        request: &PersistRequest,
        entry: ParsedEntry,
        markdown: String,
        content: VersionContent,
    ) -> Result<LookupResponse, PersistError> {
        if request.term.trim().is_empty() {
            return Err(PersistError::Validation("term must not be empty".into()));
        }
        let key = request.key();

        let word = self.save_word(&key, &entry, &markdown).await?;
        let mut response = LookupResponse::new(entry, markdown, word);

        match request.history_target() {
            Some((user_id, record_id)) => {
                self.synchronize_record(user_id, record_id, &response.word)
                    .await;
                response.version_id = self
                    .persist_version(request, user_id, record_id, &content, &response)
                    .await;
            }
            None => debug!(
                event = "persist.history_skipped",
                domain = "persist",
                key = %key,
                capture_history = request.capture_history
            ),
        }

        if let Some(context) = request.learner.as_ref().filter(|c| !c.is_empty()) {
            response = self.personalize(context, response).await;
        }

        info!(
            event = "persist.completed",
            domain = "persist",
            key = %key,
            word_id = ?response.word.id,
            version_id = ?response.version_id
        );
        Ok(response)
    }

    async fn save_word(
        &self,
        key: &WordKey,
        entry: &ParsedEntry,
        markdown: &str,
    ) -> Result<Word, PersistError> {
        let existing = self
            .words
            .find_active_by_normalized_term(&key.normalized_term, &key.language, &key.flavor)
            .await
            .map_err(|source| PersistError::SaveWord {
                key: key.clone(),
                source,
            })?;
        let word = match existing {
            Some(mut word) => {
                word.refresh(entry.clone(), markdown);
                word
            }
            None => Word::new(key, entry.clone(), markdown),
        };
        self.words
            .save(word)
            .await
            .map_err(|source| PersistError::SaveWord {
                key: key.clone(),
                source,
            })
    }

    async fn synchronize_record(&self, user_id: UserId, record_id: RecordId, word: &Word) {
        if let Err(err) = self
            .search
            .synchronize_record_term(user_id, record_id, &word.term)
            .await
        {
            warn!(
                event = "persist.record_sync_failed",
                domain = "persist",
                record_id = %record_id,
                error = %err
            );
        }
    }

    async fn persist_version(
        &self,
        request: &PersistRequest,
        user_id: UserId,
        record_id: RecordId,
        content: &VersionContent,
        response: &LookupResponse,
    ) -> Option<VersionId> {
        let text = content.resolve(response);
        match self
            .search
            .create_version(
                record_id,
                user_id,
                &request.model,
                &text,
                &response.word,
                &request.flavor,
            )
            .await
        {
            Ok(version) => {
                debug!(
                    event = "persist.version_created",
                    domain = "persist",
                    record_id = %record_id,
                    version_id = %version.id,
                    version_number = version.version_number
                );
                Some(version.id)
            }
            Err(err) => {
                warn!(
                    event = "persist.version_failed",
                    domain = "persist",
                    record_id = %record_id,
                    error = %err
                );
                None
            }
        }
    }

    async fn personalize(
        &self,
        context: &LearnerContext,
        response: LookupResponse,
    ) -> LookupResponse {
        match self.personalizer.personalize(context, response.clone()).await {
            Ok(decorated) => decorated,
            Err(err) => {
                warn!(
                    event = "persist.personalize_failed",
                    domain = "persist",
                    error = %err
                );
                response
            }
        }
    }
}
