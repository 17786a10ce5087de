//! Completed attempt history.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use examforge_core::error::StorageError;
use examforge_core::model::AttemptRecord;
use examforge_core::persistence::PersistenceLayer;
use examforge_core::statistics::{history_stats, HistoryStats};
use examforge_core::traits::AttemptRecorder;

use crate::MAX_ENTRIES;

/// Storage key of the attempt list.
pub const HISTORY_KEY: &str = "exam_history";

/// Most-recent-first list of attempt records, capped at [`MAX_ENTRIES`].
pub struct AttemptHistory {
    persistence: Arc<PersistenceLayer>,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl AttemptHistory {
    pub fn new(persistence: Arc<PersistenceLayer>) -> Self {
        Self {
            persistence,
            write_lock: Mutex::new(()),
        }
    }

    /// Every stored attempt, newest first. Unreadable storage reads as empty.
    pub async fn all(&self) -> Vec<AttemptRecord> {
        self.persistence
            .load::<Vec<AttemptRecord>>(HISTORY_KEY)
            .await
            .unwrap_or_default()
    }

    /// The stored list for a read-modify-write. Fails rather than reading
    /// unreadable storage as empty.
    async fn stored(&self) -> Result<Vec<AttemptRecord>, StorageError> {
        Ok(self
            .persistence
            .try_load::<Vec<AttemptRecord>>(HISTORY_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn for_exam(&self, exam_id: &str) -> Vec<AttemptRecord> {
        let mut attempts = self.all().await;
        attempts.retain(|a| a.exam_id == exam_id);
        attempts
    }

    /// Prepend `record`, replacing any entry with the same id, and evict
    /// beyond the cap.
    pub async fn add(&self, record: AttemptRecord) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut attempts = self.stored().await?;
        attempts.retain(|a| a.id != record.id);
        attempts.insert(0, record);
        attempts.truncate(MAX_ENTRIES);
        self.persistence.try_save(HISTORY_KEY, &attempts).await
    }

    /// Merge `incoming` by id, keeping newest first and the cap.
    /// Returns the number of stored entries.
    pub async fn merge(&self, incoming: Vec<AttemptRecord>) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut attempts = self.stored().await?;
        attempts.retain(|a| !incoming.iter().any(|i| i.id == a.id));
        attempts.extend(incoming);
        attempts.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        attempts.truncate(MAX_ENTRIES);
        self.persistence.try_save(HISTORY_KEY, &attempts).await?;
        Ok(attempts.len())
    }

    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        self.persistence.clear(HISTORY_KEY).await
    }

    /// Aggregates recomputed from the stored attempts.
    pub async fn stats(&self) -> HistoryStats {
        history_stats(&self.all().await)
    }
}

#[async_trait]
impl AttemptRecorder for AttemptHistory {
    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), StorageError> {
        tracing::debug!(attempt_id = %record.id, exam_id = %record.exam_id, "recording attempt");
        self.add(record.clone()).await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use examforge_core::model::{ScoreSummary, SubmitReason};
    use examforge_storage::MemoryStore;
    use uuid::Uuid;

    pub(crate) fn record(exam_id: &str, percentage: u32, minutes_ago: i64) -> AttemptRecord {
        AttemptRecord {
            id: Uuid::new_v4(),
            exam_id: exam_id.into(),
            exam_name: exam_id.to_uppercase(),
            totals: ScoreSummary {
                total_score: percentage,
                max_score: 100,
                correct_count: 0,
                total_questions: 10,
                percentage,
                accuracy: percentage,
            },
            time_taken_secs: 60,
            answers: Default::default(),
            flagged_question_ids: Default::default(),
            completed_at: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
                - Duration::minutes(minutes_ago),
            reason: SubmitReason::Manual,
        }
    }

    fn history() -> (Arc<MemoryStore>, AttemptHistory) {
        let store = Arc::new(MemoryStore::new());
        let layer = Arc::new(PersistenceLayer::single(store.clone()));
        (store, AttemptHistory::new(layer))
    }

    #[tokio::test]
    async fn newest_first_and_capped() {
        let (_, history) = history();
        for i in 0..(MAX_ENTRIES + 5) {
            history.add(record("rust", i as u32, 0)).await.unwrap();
        }

        let all = history.all().await;
        assert_eq!(all.len(), MAX_ENTRIES);
        assert_eq!(all[0].totals.percentage, (MAX_ENTRIES + 4) as u32);
        assert_eq!(all.last().unwrap().totals.percentage, 5);
    }

    #[tokio::test]
    async fn recorder_appends_and_stats_follow() {
        let (_, history) = history();
        history
            .record_attempt(&record("rust", 80, 10))
            .await
            .unwrap();
        history.record_attempt(&record("go", 40, 5)).await.unwrap();

        assert_eq!(history.for_exam("rust").await.len(), 1);
        let stats = history.stats().await;
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.best_percentage, 80);
        assert_eq!(stats.per_exam.len(), 2);
    }

    #[tokio::test]
    async fn merge_replaces_by_id_and_sorts() {
        let (_, history) = history();
        let old = record("rust", 10, 30);
        history.add(old.clone()).await.unwrap();

        let mut updated = old.clone();
        updated.totals.percentage = 90;
        let newer = record("go", 50, 1);
        let stored = history
            .merge(vec![updated, newer.clone()])
            .await
            .unwrap();

        assert_eq!(stored, 2);
        let all = history.all().await;
        assert_eq!(all[0].id, newer.id);
        assert_eq!(all[1].totals.percentage, 90);
    }

    #[tokio::test]
    async fn failing_storage_reports_error_and_reads_empty() {
        let (store, history) = history();
        store.set_failing(true);
        assert!(history.add(record("rust", 50, 0)).await.is_err());
        assert!(history.all().await.is_empty());
        assert_eq!(history.stats().await.total_attempts, 0);
    }

    #[tokio::test]
    async fn unreadable_history_is_not_overwritten() {
        let (store, history) = history();
        for i in 0..10 {
            history.add(record("rust", i, 0)).await.unwrap();
        }

        store.set_fail_loads(true);
        assert!(history.add(record("rust", 99, 0)).await.is_err());
        assert!(history.merge(vec![record("go", 1, 0)]).await.is_err());

        store.set_fail_loads(false);
        let all = history.all().await;
        assert_eq!(all.len(), 10);
        assert!(all.iter().all(|a| a.totals.percentage < 10));
    }

    #[tokio::test]
    async fn malformed_history_is_not_overwritten() {
        let (store, history) = history();
        store.insert(HISTORY_KEY, serde_json::json!({"not": "a list"}));

        assert!(history.add(record("rust", 50, 0)).await.is_err());
        assert_eq!(
            store.get(HISTORY_KEY),
            Some(serde_json::json!({"not": "a list"}))
        );
    }
}
