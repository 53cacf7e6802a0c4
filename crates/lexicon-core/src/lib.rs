//! Dictionary entry model and the persistence hand-off shared by every lookup
//! path.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use lexicon_core::entry::ParsedEntry;
//! use lexicon_core::persistence::{PersistRequest, VersionContent, WordPersistenceCoordinator};
//! use lexicon_core::store::{InMemorySearchService, InMemoryWordCache};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = WordPersistenceCoordinator::new(
//!     Arc::new(InMemoryWordCache::new()),
//!     Arc::new(InMemorySearchService::new()),
//! );
//! let markdown = "# tree\n\n## Definitions\n1. A woody plant.\n";
//! let entry = ParsedEntry::parse_markdown(markdown)?;
//! let request = PersistRequest {
//!     user_id: None,
//!     record_id: None,
//!     capture_history: false,
//!     term: "tree".into(),
//!     language: "en".into(),
//!     flavor: "standard".into(),
//!     model: "gpt-4o-mini".into(),
//!     learner: None,
//! };
//! coordinator
//!     .persist(&request, entry, markdown.into(), VersionContent::ResponseMarkdown)
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Environment-driven runtime configuration.
pub mod config;
/// Structured dictionary entry and markdown parsing.
pub mod entry;
/// Error types shared across the workspace.
pub mod errors;
/// Identifiers, cached words, search records, and version snapshots.
pub mod model;
/// Process-wide tracing setup.
pub mod observability;
/// The four-step word persistence pipeline.
pub mod persistence;
/// Built-in personalizers.
pub mod personalize;
/// Collaborator traits and in-memory backends.
pub mod store;

pub use config::LexiconConfig;
pub use entry::ParsedEntry;
pub use errors::{ConfigError, EntryParseError, PersistError, PersonalizeError, StoreError};
pub use model::{
    LearnerContext, LookupResponse, RecordId, SearchRecord, SearchResultVersion, UserId,
    VersionId, Word, WordId, WordKey, normalize_term,
};
pub use observability::init_observability;
pub use persistence::{PersistRequest, VersionContent, WordPersistenceCoordinator};
