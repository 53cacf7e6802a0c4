use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entry::ParsedEntry;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Account that issued a lookup.
    UserId
);
id_type!(
    /// Identity of a `SearchRecord`; never changes once assigned.
    RecordId
);
id_type!(
    /// Identity of a cached `Word` row.
    WordId
);
id_type!(
    /// Identity of an immutable `SearchResultVersion`.
    VersionId
);

/// Lowercases, trims, and collapses whitespace runs so that `"  Colour "` and
/// `"colour"` share one cache row.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Cache key of a `Word`: `(normalized_term, language, flavor)`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct WordKey {
    pub normalized_term: String,
    pub language: String,
    pub flavor: String,
}

impl WordKey {
    /// Builds a key, normalizing the term.
    pub fn new(term: &str, language: impl Into<String>, flavor: impl Into<String>) -> Self {
        Self {
            normalized_term: normalize_term(term),
            language: language.into(),
            flavor: flavor.into(),
        }
    }
}

impl fmt::Display for WordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.normalized_term, self.language, self.flavor)
    }
}

/// Cached dictionary entry. Holds only the latest parse for its key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// Assigned by the cache on first save.
    pub id: Option<WordId>,
    /// Display spelling preferred by the model (may differ in casing from the query).
    pub term: String,
    pub normalized_term: String,
    pub language: String,
    pub flavor: String,
    pub entry: ParsedEntry,
    pub markdown: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Word {
    /// Creates an unsaved word for `key`.
    pub fn new(key: &WordKey, entry: ParsedEntry, markdown: impl Into<String>) -> Self {
        let now = Utc::now();
        let term = if entry.headword.trim().is_empty() {
            key.normalized_term.clone()
        } else {
            entry.headword.trim().to_string()
        };
        Self {
            id: None,
            term,
            normalized_term: key.normalized_term.clone(),
            language: key.language.clone(),
            flavor: key.flavor.clone(),
            entry,
            markdown: markdown.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn key(&self) -> WordKey {
        WordKey {
            normalized_term: self.normalized_term.clone(),
            language: self.language.clone(),
            flavor: self.flavor.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Replaces content with a fresh parse, keeping identity and creation time.
    pub fn refresh(&mut self, entry: ParsedEntry, markdown: impl Into<String>) {
        if !entry.headword.trim().is_empty() {
            self.term = entry.headword.trim().to_string();
        }
        self.entry = entry;
        self.markdown = markdown.into();
        self.updated_at = Utc::now();
    }
}

/// Originating query row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub term: String,
    pub language: String,
    pub flavor: String,
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of one generated answer for a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultVersion {
    pub id: VersionId,
    pub record_id: RecordId,
    pub user_id: UserId,
    pub version_number: u32,
    pub model: String,
    pub content: String,
    pub word_id: Option<WordId>,
    pub flavor: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Learner profile used to personalize a finished entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerContext {
    pub native_language: Option<String>,
    pub level: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

impl LearnerContext {
    pub fn is_empty(&self) -> bool {
        self.native_language.is_none() && self.level.is_none() && self.interests.is_empty()
    }
}

/// Response object threaded through the persistence steps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub word: Word,
    pub entry: ParsedEntry,
    /// Raw model markdown as received (sentinel already stripped).
    pub markdown: String,
    pub version_id: Option<VersionId>,
    pub personal_note: Option<String>,
}

impl LookupResponse {
    pub fn new(entry: ParsedEntry, markdown: impl Into<String>, word: Word) -> Self {
        Self {
            word,
            entry,
            markdown: markdown.into(),
            version_id: None,
            personal_note: None,
        }
    }
}
