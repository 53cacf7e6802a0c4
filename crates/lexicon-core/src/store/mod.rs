//! Collaborator contracts used by the persistence hand-off.
//!
//! The traits are narrow on purpose: the coordinator only needs to upsert a
//! cached word, keep the search record in sync, append a version snapshot, and
//! decorate the response. Implementations must be `Send + Sync` so one
//! instance can serve every in-flight stream.

pub mod memory;

use async_trait::async_trait;

use crate::errors::{PersonalizeError, StoreError};
use crate::model::{
    LearnerContext, LookupResponse, RecordId, SearchResultVersion, UserId, Word,
};

pub use memory::{InMemorySearchService, InMemoryWordCache};

/// Search history backend.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Rewrites the record's canonical term. The record id never changes.
    async fn synchronize_record_term(
        &self,
        user_id: UserId,
        record_id: RecordId,
        canonical_term: &str,
    ) -> Result<(), StoreError>;

    /// Appends an immutable version for `record_id`.
    ///
    /// Implementations must assign `version_number` atomically per record:
    /// two concurrent calls for the same record never receive the same number.
    async fn create_version(
        &self,
        record_id: RecordId,
        user_id: UserId,
        model: &str,
        content: &str,
        word: &Word,
        flavor: &str,
    ) -> Result<SearchResultVersion, StoreError>;
}

/// Word lookup cache keyed by `(normalized_term, language, flavor)`.
#[async_trait]
pub trait WordCache: Send + Sync {
    async fn find_active_by_normalized_term(
        &self,
        normalized_term: &str,
        language: &str,
        flavor: &str,
    ) -> Result<Option<Word>, StoreError>;

    /// Inserts or updates `word`, returning the stored row (with its id).
    async fn save(&self, word: Word) -> Result<Word, StoreError>;
}

/// Learner-aware decoration of a finished response.
#[async_trait]
pub trait Personalizer: Send + Sync {
    async fn personalize(
        &self,
        context: &LearnerContext,
        response: LookupResponse,
    ) -> Result<LookupResponse, PersonalizeError>;
}
