use serde::{Deserialize, Serialize};

use lexicon_core::{LearnerContext, RecordId, UserId};

use crate::errors::LookupError;

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_FLAVOR: &str = "standard";

/// One dictionary lookup as issued by a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub term: String,
    pub language: String,
    pub flavor: String,
    /// Overrides the streamer's default model.
    pub model: Option<String>,
    pub user_id: Option<UserId>,
    pub record_id: Option<RecordId>,
    /// When false the lookup never touches search history.
    pub capture_history: bool,
    pub learner: Option<LearnerContext>,
}

impl LookupRequest {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            language: DEFAULT_LANGUAGE.to_string(),
            flavor: DEFAULT_FLAVOR.to_string(),
            model: None,
            user_id: None,
            record_id: None,
            capture_history: false,
            learner: None,
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn flavor(mut self, flavor: impl Into<String>) -> Self {
        self.flavor = flavor.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Captures the result into `record_id`'s version history.
    pub fn history(mut self, user_id: UserId, record_id: RecordId) -> Self {
        self.user_id = Some(user_id);
        self.record_id = Some(record_id);
        self.capture_history = true;
        self
    }

    /// Generates a fresh answer without writing history.
    pub fn force_new(mut self) -> Self {
        self.capture_history = false;
        self
    }

    pub fn learner(mut self, context: LearnerContext) -> Self {
        self.learner = Some(context);
        self
    }

    pub(crate) fn validate(&self) -> Result<(), LookupError> {
        if self.term.trim().is_empty() {
            return Err(LookupError::Validation("term must not be empty".into()));
        }
        if self.language.trim().is_empty() {
            return Err(LookupError::Validation("language must not be empty".into()));
        }
        if self.flavor.trim().is_empty() {
            return Err(LookupError::Validation("flavor must not be empty".into()));
        }
        if self.capture_history && (self.user_id.is_none() || self.record_id.is_none()) {
            return Err(LookupError::Validation(
                "history capture needs both a user id and a record id".into(),
            ));
        }
        Ok(())
    }
}
