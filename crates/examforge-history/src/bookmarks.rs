//! Bookmarked questions, keyed by `(question_id, exam_id)`.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use examforge_core::error::StorageError;
use examforge_core::model::Bookmark;
use examforge_core::persistence::PersistenceLayer;
use examforge_core::traits::BookmarkRecorder;

use crate::MAX_ENTRIES;

/// Storage key of the bookmark list.
pub const BOOKMARKS_KEY: &str = "exam_bookmarks";

/// Most-recent-first bookmark list, capped at [`MAX_ENTRIES`]. At most one
/// entry exists per key.
pub struct BookmarkStore {
    persistence: Arc<PersistenceLayer>,
    write_lock: Mutex<()>,
}

impl BookmarkStore {
    pub fn new(persistence: Arc<PersistenceLayer>) -> Self {
        Self {
            persistence,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn all(&self) -> Vec<Bookmark> {
        self.persistence
            .load::<Vec<Bookmark>>(BOOKMARKS_KEY)
            .await
            .unwrap_or_default()
    }

    async fn stored(&self) -> Result<Vec<Bookmark>, StorageError> {
        Ok(self
            .persistence
            .try_load::<Vec<Bookmark>>(BOOKMARKS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn for_exam(&self, exam_id: &str) -> Vec<Bookmark> {
        let mut bookmarks = self.all().await;
        bookmarks.retain(|b| b.exam_id == exam_id);
        bookmarks
    }

    pub async fn is_bookmarked(&self, question_id: &str, exam_id: &str) -> bool {
        self.all()
            .await
            .iter()
            .any(|b| b.same_key(question_id, exam_id))
    }

    /// Add `bookmark` at the front. An existing entry with the same key is
    /// replaced, so the latest note wins.
    pub async fn add(&self, bookmark: Bookmark) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut bookmarks = self.stored().await?;
        bookmarks.retain(|b| !b.same_key(&bookmark.question_id, &bookmark.exam_id));
        bookmarks.insert(0, bookmark);
        bookmarks.truncate(MAX_ENTRIES);
        self.persistence.try_save(BOOKMARKS_KEY, &bookmarks).await
    }

    /// Remove the bookmark for the key. Returns `false` if there was none.
    pub async fn remove(&self, question_id: &str, exam_id: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut bookmarks = self.stored().await?;
        let before = bookmarks.len();
        bookmarks.retain(|b| !b.same_key(question_id, exam_id));
        if bookmarks.len() == before {
            return Ok(false);
        }
        self.persistence.try_save(BOOKMARKS_KEY, &bookmarks).await?;
        Ok(true)
    }

    /// Replace the note on an existing bookmark. Returns `false` if absent.
    pub async fn update_note(
        &self,
        question_id: &str,
        exam_id: &str,
        note: &str,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut bookmarks = self.stored().await?;
        let Some(entry) = bookmarks
            .iter_mut()
            .find(|b| b.same_key(question_id, exam_id))
        else {
            return Ok(false);
        };
        entry.note = note.to_string();
        self.persistence.try_save(BOOKMARKS_KEY, &bookmarks).await?;
        Ok(true)
    }

    /// Merge `incoming` by key, keeping newest first and the cap.
    pub async fn merge(&self, incoming: Vec<Bookmark>) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut bookmarks = self.stored().await?;
        bookmarks.retain(|b| {
            !incoming
                .iter()
                .any(|i| i.same_key(&b.question_id, &b.exam_id))
        });
        bookmarks.extend(incoming);
        bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut seen = HashSet::new();
        bookmarks.retain(|b| seen.insert((b.question_id.clone(), b.exam_id.clone())));
        bookmarks.truncate(MAX_ENTRIES);
        self.persistence.try_save(BOOKMARKS_KEY, &bookmarks).await?;
        Ok(bookmarks.len())
    }

    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        self.persistence.clear(BOOKMARKS_KEY).await
    }
}

#[async_trait]
impl BookmarkRecorder for BookmarkStore {
    async fn add_bookmark(&self, bookmark: Bookmark) -> Result<(), StorageError> {
        self.add(bookmark).await
    }

    async fn remove_bookmark(&self, question_id: &str, exam_id: &str) -> Result<(), StorageError> {
        self.remove(question_id, exam_id).await.map(|_| ())
    }
}
