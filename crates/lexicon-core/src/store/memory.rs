//! In-memory collaborator backends.
//!
//! Used by the CLI and by tests. Rows live in `DashMap`s; version numbering is
//! done while holding the record's map entry so concurrent completions for one
//! record are serialized.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use crate::errors::StoreError;
use crate::model::{
    RecordId, SearchRecord, SearchResultVersion, UserId, VersionId, Word, WordId, WordKey,
};

use super::{SearchService, WordCache};

/// In-memory `WordCache`.
///
/// At most one active row exists per key; a second unsaved word for an
/// occupied key overwrites the active row (last writer wins).
#[derive(Default)]
pub struct InMemoryWordCache {
    rows: DashMap<WordId, Word>,
    active: DashMap<WordKey, WordId>,
    next_id: AtomicI64,
}

impl InMemoryWordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of active rows.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Marks the active row for `key` deleted and frees the key.
    pub fn soft_delete(&self, key: &WordKey) -> Option<Word> {
        let (_, id) = self.active.remove(key)?;
        let mut row = self.rows.get_mut(&id)?;
        row.deleted_at = Some(Utc::now());
        Some(row.clone())
    }

    fn allocate_id(&self) -> WordId {
        WordId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl WordCache for InMemoryWordCache {
    async fn find_active_by_normalized_term(
        &self,
        normalized_term: &str,
        language: &str,
        flavor: &str,
    ) -> Result<Option<Word>, StoreError> {
        let key = WordKey {
            normalized_term: normalized_term.to_string(),
            language: language.to_string(),
            flavor: flavor.to_string(),
        };
        let Some(id) = self.active.get(&key).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self
            .rows
            .get(&id)
            .filter(|row| row.is_active())
            .map(|row| row.clone()))
    }

    async fn save(&self, mut word: Word) -> Result<Word, StoreError> {
        let key = word.key();
        match word.id {
            Some(id) => {
                {
                    let mut row = self
                        .rows
                        .get_mut(&id)
                        .ok_or(StoreError::WordNotFound(id))?;
                    *row = word.clone();
                }
                if word.is_active() {
                    self.active.insert(key, id);
                }
            }
            None => {
                // Key guard is held until the row is written.
                let slot = self.active.entry(key).or_insert_with(|| self.allocate_id());
                let id = *slot;
                if let Some(existing) = self.rows.get(&id) {
                    word.created_at = existing.created_at;
                }
                word.id = Some(id);
                self.rows.insert(id, word.clone());
                drop(slot);
            }
        }
        debug!(
            event = "store.word_saved",
            domain = "store",
            word_id = ?word.id,
            term = word.term.as_str()
        );
        Ok(word)
    }
}

/// In-memory `SearchService` that also owns the search records.
#[derive(Default)]
pub struct InMemorySearchService {
    records: DashMap<RecordId, SearchRecord>,
    versions: DashMap<RecordId, Vec<SearchResultVersion>>,
    next_record_id: AtomicI64,
    next_version_id: AtomicI64,
}

impl InMemorySearchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the originating query row for a lookup.
    pub fn create_record(
        &self,
        user_id: UserId,
        term: impl Into<String>,
        language: impl Into<String>,
        flavor: impl Into<String>,
    ) -> SearchRecord {
        let now = Utc::now();
        let record = SearchRecord {
            id: RecordId(self.next_record_id.fetch_add(1, Ordering::SeqCst) + 1),
            user_id,
            term: term.into(),
            language: language.into(),
            flavor: flavor.into(),
            favorite: false,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.id, record.clone());
        record
    }

    pub fn record(&self, record_id: RecordId) -> Option<SearchRecord> {
        self.records.get(&record_id).map(|r| r.clone())
    }

    /// Non-deleted versions of a record, oldest first.
    pub fn list_versions(&self, record_id: RecordId) -> Vec<SearchResultVersion> {
        self.versions
            .get(&record_id)
            .map(|versions| {
                versions
                    .iter()
                    .filter(|v| v.deleted_at.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_favorite(
        &self,
        user_id: UserId,
        record_id: RecordId,
        favorite: bool,
    ) -> Result<SearchRecord, StoreError> {
        let mut record = self.owned_record(user_id, record_id)?;
        record.favorite = favorite;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    /// Hides a version from history; the number is never reused.
    pub fn soft_delete_version(
        &self,
        user_id: UserId,
        version_id: VersionId,
    ) -> Result<(), StoreError> {
        for mut entry in self.versions.iter_mut() {
            if let Some(version) = entry.iter_mut().find(|v| v.id == version_id) {
                if version.user_id != user_id {
                    return Err(StoreError::Forbidden {
                        record_id: version.record_id,
                    });
                }
                version.deleted_at.get_or_insert_with(Utc::now);
                return Ok(());
            }
        }
        Err(StoreError::VersionNotFound(version_id))
    }

    fn owned_record(
        &self,
        user_id: UserId,
        record_id: RecordId,
    ) -> Result<dashmap::mapref::one::RefMut<'_, RecordId, SearchRecord>, StoreError> {
        let record = self
            .records
            .get_mut(&record_id)
            .ok_or(StoreError::RecordNotFound(record_id))?;
        if record.user_id != user_id {
            return Err(StoreError::Forbidden { record_id });
        }
        Ok(record)
    }
}

#[async_trait]
impl SearchService for InMemorySearchService {
    async fn synchronize_record_term(
        &self,
        user_id: UserId,
        record_id: RecordId,
        canonical_term: &str,
    ) -> Result<(), StoreError> {
        let mut record = self.owned_record(user_id, record_id)?;
        if record.term != canonical_term {
            record.term = canonical_term.to_string();
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn create_version(
        &self,
        record_id: RecordId,
        user_id: UserId,
        model: &str,
        content: &str,
        word: &Word,
        flavor: &str,
    ) -> Result<SearchResultVersion, StoreError> {
        drop(self.owned_record(user_id, record_id)?);

        let mut versions = self.versions.entry(record_id).or_default();
        let version_number = versions
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        let mut created_at = Utc::now();
        if let Some(last) = versions.last()
            && created_at <= last.created_at
        {
            created_at = last.created_at + Duration::microseconds(1);
        }
        let version = SearchResultVersion {
            id: VersionId(self.next_version_id.fetch_add(1, Ordering::SeqCst) + 1),
            record_id,
            user_id,
            version_number,
            model: model.to_string(),
            content: content.to_string(),
            word_id: word.id,
            flavor: flavor.to_string(),
            created_at,
            deleted_at: None,
        };
        versions.push(version.clone());
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::entry::ParsedEntry;

    fn word(term: &str) -> Word {
        Word::new(
            &WordKey::new(term, "en", "standard"),
            ParsedEntry {
                headword: term.to_string(),
                ..ParsedEntry::default()
            },
            format!("# {term}"),
        )
    }

    #[tokio::test]
    async fn save_assigns_id_and_upserts_by_key() {
        let cache = InMemoryWordCache::new();
        let first = cache.save(word("tree")).await.expect("save");
        assert!(first.id.is_some());

        let second = cache.save(word("Tree")).await.expect("save again");
        assert_eq!(second.id, first.id);
        assert_eq!(cache.active_len(), 1);

        let found = cache
            .find_active_by_normalized_term("tree", "en", "standard")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.term, "Tree");
    }

    #[tokio::test]
    async fn soft_deleted_word_is_not_found_and_key_is_reusable() {
        let cache = InMemoryWordCache::new();
        let saved = cache.save(word("leaf")).await.expect("save");
        let key = saved.key();
        assert!(cache.soft_delete(&key).is_some());
        assert!(
            cache
                .find_active_by_normalized_term("leaf", "en", "standard")
                .await
                .expect("find")
                .is_none()
        );
        let fresh = cache.save(word("leaf")).await.expect("save");
        assert_ne!(fresh.id, saved.id);
    }

    #[tokio::test]
    async fn versions_are_numbered_sequentially_with_increasing_timestamps() {
        let search = InMemorySearchService::new();
        let record = search.create_record(UserId(1), "tree", "en", "standard");
        let w = word("tree");
        for _ in 0..5 {
            search
                .create_version(record.id, UserId(1), "m", "content", &w, "standard")
                .await
                .expect("version");
        }
        let versions = search.list_versions(record.id);
        let numbers: Vec<u32> = versions.iter().map(|v| v.version_number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(versions.windows(2).all(|w| w[0].created_at < w[1].created_at));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_versions_never_share_a_number() {
        let search = Arc::new(InMemorySearchService::new());
        let record = search.create_record(UserId(1), "tree", "en", "standard");
        let mut handles = Vec::new();
        for _ in 0..16 {
            let search = search.clone();
            let w = word("tree");
            handles.push(tokio::spawn(async move {
                search
                    .create_version(record.id, UserId(1), "m", "c", &w, "standard")
                    .await
                    .expect("version")
                    .version_number
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.expect("join"));
        }
        numbers.sort_unstable();
        assert_eq!(numbers, (1..=16).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn deleted_versions_keep_their_number_reserved() {
        let search = InMemorySearchService::new();
        let record = search.create_record(UserId(1), "tree", "en", "standard");
        let w = word("tree");
        let v1 = search
            .create_version(record.id, UserId(1), "m", "a", &w, "standard")
            .await
            .expect("v1");
        search
            .soft_delete_version(UserId(1), v1.id)
            .expect("delete");
        let v2 = search
            .create_version(record.id, UserId(1), "m", "b", &w, "standard")
            .await
            .expect("v2");
        assert_eq!(v2.version_number, 2);
        assert_eq!(search.list_versions(record.id).len(), 1);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_record() {
        let search = InMemorySearchService::new();
        let record = search.create_record(UserId(1), "tree", "en", "standard");
        let err = search
            .synchronize_record_term(UserId(2), record.id, "Tree")
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Forbidden { record_id: record.id });
        assert!(search.set_favorite(UserId(1), record.id, true).expect("fav").favorite);
    }

    #[tokio::test]
    async fn synchronize_rewrites_term_but_not_id() {
        let search = InMemorySearchService::new();
        let record = search.create_record(UserId(1), "colour", "en", "standard");
        search
            .synchronize_record_term(UserId(1), record.id, "Colour")
            .await
            .expect("sync");
        let updated = search.record(record.id).expect("record");
        assert_eq!(updated.id, record.id);
        assert_eq!(updated.term, "Colour");
    }
}
