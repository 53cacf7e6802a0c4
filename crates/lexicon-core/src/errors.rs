use crate::model::{RecordId, VersionId, WordId, WordKey};

/// Failure turning a finished transcript into a `ParsedEntry`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryParseError {
    /// Transcript had no content at all.
    #[error("entry markdown is empty")]
    Empty,
    /// No level-one heading naming the headword.
    #[error("entry markdown has no headword heading")]
    MissingHeadword,
    /// Headword found but no definition lines.
    #[error("entry for {headword:?} has no definitions")]
    MissingDefinitions { headword: String },
}

/// Errors reported by collaborator backends.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("search record {0} not found")]
    RecordNotFound(RecordId),
    #[error("search result version {0} not found")]
    VersionNotFound(VersionId),
    #[error("search record {record_id} does not belong to the requesting user")]
    Forbidden { record_id: RecordId },
    #[error("word {0} not found")]
    WordNotFound(WordId),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Failure of the personalization collaborator. Never fatal to a lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("personalization failed: {0}")]
pub struct PersonalizeError(pub String);

/// Failure of the persistence hand-off as a whole.
///
/// Only the word save is fatal; the later steps log and continue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PersistError {
    #[error("failed to save word {key}: {source}")]
    SaveWord {
        key: WordKey,
        #[source]
        source: StoreError,
    },
    #[error("invalid persistence request: {0}")]
    Validation(String),
}

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}
