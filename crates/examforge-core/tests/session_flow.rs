//! Session lifecycle tests against in-memory collaborators.
//!
//! All tests run on a paused tokio clock, so timer and auto-save behavior is
//! driven by `tokio::time::sleep` without real waiting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use examforge_core::model::{
    Answer, AttemptRecord, Bookmark, Difficulty, ExamDefinition, Question, QuestionKind,
    QuestionOption, SessionStatus, SubmitReason,
};
use examforge_core::resume::{ResumeChoice, ResumeDecision};
use examforge_core::scoring;
use examforge_core::traits::{AttemptRecorder, BookmarkRecorder, SnapshotStore};
use examforge_core::{
    ExamError, ExamSession, PersistenceLayer, SessionConfig, SessionEvent, SessionServices,
    StorageError, SubmitOutcome,
};
use serde_json::Value;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryBackend {
    data: Mutex<HashMap<String, Value>>,
    failing: AtomicBool,
}

impl MemoryBackend {
    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorageError::Network("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnapshotStore for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.check()?;
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.check()?;
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    attempts: Mutex<Vec<AttemptRecord>>,
    bookmarks: Mutex<Vec<Bookmark>>,
}

impl Recorder {
    fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.lock().unwrap().clone()
    }

    fn bookmark_ids(&self) -> Vec<String> {
        self.bookmarks
            .lock()
            .unwrap()
            .iter()
            .map(|b| b.question_id.clone())
            .collect()
    }
}

#[async_trait]
impl AttemptRecorder for Recorder {
    async fn record_attempt(&self, record: &AttemptRecord) -> Result<(), StorageError> {
        self.attempts.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl BookmarkRecorder for Recorder {
    async fn add_bookmark(&self, bookmark: Bookmark) -> Result<(), StorageError> {
        let mut bookmarks = self.bookmarks.lock().unwrap();
        bookmarks.retain(|b| !b.same_key(&bookmark.question_id, &bookmark.exam_id));
        bookmarks.push(bookmark);
        Ok(())
    }

    async fn remove_bookmark(&self, question_id: &str, exam_id: &str) -> Result<(), StorageError> {
        self.bookmarks
            .lock()
            .unwrap()
            .retain(|b| !b.same_key(question_id, exam_id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    backend: Arc<MemoryBackend>,
    persistence: Arc<PersistenceLayer>,
    recorder: Arc<Recorder>,
    exam: Arc<ExamDefinition>,
}

impl Harness {
    fn new(exam: ExamDefinition) -> Self {
        let backend = Arc::new(MemoryBackend::default());
        let persistence = Arc::new(PersistenceLayer::single(backend.clone()));
        Self {
            backend,
            persistence,
            recorder: Arc::new(Recorder::default()),
            exam: Arc::new(exam),
        }
    }

    fn session(&self) -> Arc<ExamSession> {
        let services = SessionServices {
            persistence: Arc::clone(&self.persistence),
            attempts: self.recorder.clone(),
            bookmarks: self.recorder.clone(),
        };
        ExamSession::new(Arc::clone(&self.exam), services, SessionConfig::default())
    }
}

fn option(id: &str, is_correct: bool) -> QuestionOption {
    QuestionOption {
        id: id.into(),
        label: id.to_uppercase(),
        is_correct,
    }
}

fn question(id: &str, kind: QuestionKind, points: u32) -> Question {
    let (options, correct_answer) = match kind {
        QuestionKind::SingleSelect => (vec![option("a", true), option("b", false)], None),
        QuestionKind::MultiSelect => (
            vec![option("a", true), option("b", true), option("c", false)],
            None,
        ),
        QuestionKind::Text => (vec![], Some("Ownership".to_string())),
    };
    Question {
        id: id.into(),
        title: format!("Question {id}"),
        kind,
        options,
        correct_answer,
        points,
        difficulty: Difficulty::Medium,
        tags: vec![],
        hint: None,
    }
}

fn exam(minutes: u32) -> ExamDefinition {
    ExamDefinition {
        id: "rust-basics".into(),
        name: "Rust Basics".into(),
        description: String::new(),
        time_limit_minutes: minutes,
        questions: vec![
            question("q1", QuestionKind::SingleSelect, 5),
            question("q2", QuestionKind::MultiSelect, 3),
            question("q3", QuestionKind::Text, 2),
        ],
    }
}

/// Let spawned write-through tasks run without crossing a timer tick.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn submit_without_answers_scores_zero() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    let SubmitOutcome::Submitted(record) = session.submit().await.unwrap() else {
        panic!("expected a submitted outcome");
    };
    assert_eq!(record.totals.total_score, 0);
    assert_eq!(record.totals.max_score, 10);
    assert_eq!(record.totals.correct_count, 0);
    assert_eq!(record.totals.percentage, 0);
    assert_eq!(record.reason, SubmitReason::Manual);
    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(h.recorder.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn answers_are_scored_and_recomputable_from_record() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    assert!(session.answer("q1", "a").unwrap());
    assert!(session.answer("q2", "b").unwrap());
    assert!(session.answer("q2", "a").unwrap());
    assert!(session.answer("q3", "  ownership ").unwrap());
    assert_eq!(session.answer_for("q2"), Some(Answer::set(["a", "b"])));

    let SubmitOutcome::Submitted(record) = session.submit().await.unwrap() else {
        panic!("expected a submitted outcome");
    };
    assert_eq!(record.totals.total_score, 10);
    assert_eq!(record.totals.percentage, 100);
    assert_eq!(record.totals.correct_count, 3);

    let recomputed = scoring::score(&h.exam, &record.answers);
    assert_eq!(recomputed, record.totals);
}

#[tokio::test(start_paused = true)]
async fn partial_multi_select_earns_nothing() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    session.answer("q1", "b").unwrap();
    session.answer("q2", "a").unwrap();

    let SubmitOutcome::Submitted(record) = session.submit().await.unwrap() else {
        panic!("expected a submitted outcome");
    };
    assert_eq!(record.totals.total_score, 0);
    assert_eq!(record.totals.percentage, 0);
}

#[tokio::test(start_paused = true)]
async fn toggling_a_choice_twice_is_a_no_op() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    session.answer("q2", "a").unwrap();
    let before = session.answer_for("q2");
    session.answer("q2", "c").unwrap();
    session.answer("q2", "c").unwrap();
    assert_eq!(session.answer_for("q2"), before);

    session.answer("q2", "a").unwrap();
    assert_eq!(session.answer_for("q2"), None);
}

#[tokio::test(start_paused = true)]
async fn single_select_replaces_previous_answer() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    session.answer("q1", "a").unwrap();
    session.answer("q1", "b").unwrap();
    assert_eq!(session.answer_for("q1"), Some(Answer::from("b")));
}

#[tokio::test(start_paused = true)]
async fn answer_before_start_is_ignored() {
    let h = Harness::new(exam(10));
    let session = h.session();
    assert!(!session.answer("q1", "a").unwrap());
    assert_eq!(session.answer_for("q1"), None);
    assert_eq!(session.navigate(2).unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_question_is_rejected() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();
    assert!(matches!(
        session.answer("nope", "a"),
        Err(ExamError::UnknownQuestion(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn navigation_clamps_to_bounds() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    assert_eq!(session.navigate(99).unwrap(), 2);
    assert_eq!(session.next().unwrap(), 2);
    assert_eq!(session.previous().unwrap(), 1);
    assert_eq!(session.navigate(0).unwrap(), 0);
    assert_eq!(session.previous().unwrap(), 0);
    assert_eq!(session.current_question().map(|q| q.id.as_str()), Some("q1"));
}

#[tokio::test(start_paused = true)]
async fn starting_twice_or_empty_exam_is_an_error() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();
    assert!(session.start().unwrap_err().is_invalid_state());

    let mut empty = exam(10);
    empty.questions.clear();
    let session = Harness::new(empty).session();
    assert!(matches!(session.start(), Err(ExamError::EmptyExam(_))));
}

#[tokio::test(start_paused = true)]
async fn completed_session_rejects_mutations() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();
    session.submit().await.unwrap();

    assert!(session.answer("q1", "a").unwrap_err().is_invalid_state());
    assert!(session.navigate(1).unwrap_err().is_invalid_state());
    assert!(session.toggle_flag("q1").unwrap_err().is_invalid_state());
    assert!(session.toggle_bookmark("q1").unwrap_err().is_invalid_state());
    assert!(session.pause().unwrap_err().is_invalid_state());

    assert_eq!(
        session.submit().await.unwrap(),
        SubmitOutcome::AlreadyCompleted
    );
    assert_eq!(h.recorder.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_record_one_attempt() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    let (a, b) = tokio::join!(session.submit(), session.submit());
    let outcomes = [a.unwrap(), b.unwrap()];
    let submitted = outcomes
        .iter()
        .filter(|o| matches!(o, SubmitOutcome::Submitted(_)))
        .count();
    assert_eq!(submitted, 1);
    assert!(outcomes.contains(&SubmitOutcome::AlreadyCompleted));
    assert_eq!(h.recorder.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn submit_clears_the_saved_session() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();
    session.answer("q1", "a").unwrap();
    settle().await;
    assert!(h.persistence.load_snapshot("rust-basics").await.is_some());

    session.submit().await.unwrap();
    settle().await;
    assert!(h.persistence.load_snapshot("rust-basics").await.is_none());

    let next = h.session();
    assert_eq!(next.check_resume().await, ResumeDecision::Fresh);
}

#[tokio::test(start_paused = true)]
async fn write_through_keeps_latest_answers() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    for value in ["a", "b", "a", "b", "a"] {
        session.answer("q1", value).unwrap();
    }
    session.answer("q3", "borrowing").unwrap();
    settle().await;

    let stored = h.persistence.load_snapshot("rust-basics").await.unwrap();
    assert_eq!(stored.answers.get("q1"), Some(&Answer::from("a")));
    assert_eq!(stored.answers.get("q3"), Some(&Answer::from("borrowing")));
    assert!(!session.is_dirty());
    assert!(session.last_saved_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn storage_failure_never_blocks_answering() {
    let h = Harness::new(exam(10));
    h.backend.set_failing(true);
    let session = h.session();
    let mut rx = session.subscribe();

    session.start().unwrap();
    assert!(session.answer("q1", "a").unwrap());
    settle().await;

    assert_eq!(session.status(), SessionStatus::InProgress);
    assert_eq!(session.answer_for("q1"), Some(Answer::from("a")));
    assert!(session.is_dirty());
    let events = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::SaveFailed { .. })));

    h.backend.set_failing(false);
    session.answer("q3", "ownership").unwrap();
    settle().await;
    assert!(!session.is_dirty());
}

#[tokio::test(start_paused = true)]
async fn autosave_snapshot_resumes_exactly() {
    let h = Harness::new(exam(10));
    let first = h.session();
    let mut rx = first.subscribe();
    first.start().unwrap();
    first.answer("q1", "a").unwrap();
    first.answer("q2", "b").unwrap();
    first.toggle_flag("q2").unwrap();
    first.navigate(2).unwrap();

    tokio::time::sleep(Duration::from_millis(30_500)).await;
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::AutoSaved { .. })));
    first.stop();
    drop(first);

    let stored = h.persistence.load_snapshot("rust-basics").await.unwrap();
    assert_eq!(stored.status, SessionStatus::InProgress);
    assert_eq!(stored.current_question_index, 2);
    assert!(stored.remaining_time_secs < 600);

    let second = h.session();
    let mut rx = second.subscribe();
    let ResumeDecision::Available(snapshot) = second.check_resume().await else {
        panic!("expected a resumable session");
    };
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, SessionEvent::ResumeAvailable { .. })));
    second
        .apply_choice(ResumeChoice::Resume, &snapshot)
        .await
        .unwrap();

    assert_eq!(second.status(), SessionStatus::InProgress);
    assert_eq!(second.remaining_secs(), stored.remaining_time_secs);
    assert_eq!(second.current_index(), 2);
    assert_eq!(second.answer_for("q1"), Some(Answer::from("a")));
    assert_eq!(second.answer_for("q2"), Some(Answer::set(["b"])));
    assert!(second.is_flagged("q2"));
    assert!(!second.is_flagged("q1"));
}

#[tokio::test(start_paused = true)]
async fn start_new_discards_saved_session() {
    let h = Harness::new(exam(10));
    let first = h.session();
    first.start().unwrap();
    first.answer("q1", "a").unwrap();
    settle().await;
    first.stop();

    let second = h.session();
    let ResumeDecision::Available(snapshot) = second.check_resume().await else {
        panic!("expected a resumable session");
    };
    second
        .apply_choice(ResumeChoice::StartNew, &snapshot)
        .await
        .unwrap();

    assert_eq!(second.answer_for("q1"), None);
    assert_eq!(second.remaining_secs(), 600);
    settle().await;
    let stored = h.persistence.load_snapshot("rust-basics").await.unwrap();
    assert!(stored.answers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn countdown_warns_then_submits_on_expiry() {
    let h = Harness::new(exam(6));
    let session = h.session();
    let mut rx = session.subscribe();
    session.start().unwrap();
    session.answer("q1", "a").unwrap();

    tokio::time::sleep(Duration::from_secs(361)).await;

    assert_eq!(session.status(), SessionStatus::Completed);
    assert_eq!(session.remaining_secs(), 0);

    let events = drain(&mut rx);
    let warnings: Vec<_> = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::TimeWarning { .. }
                    | SessionEvent::FinalWarning { .. }
                    | SessionEvent::Expired
            )
        })
        .cloned()
        .collect();
    assert_eq!(
        warnings,
        vec![
            SessionEvent::TimeWarning {
                remaining_secs: 300
            },
            SessionEvent::FinalWarning { remaining_secs: 60 },
            SessionEvent::Expired,
        ]
    );
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Submitted { .. }))
            .count(),
        1
    );

    let attempts = h.recorder.attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].reason, SubmitReason::TimeExpired);
    assert_eq!(attempts[0].time_taken_secs, 360);
    assert_eq!(attempts[0].totals.total_score, 5);
}

#[tokio::test(start_paused = true)]
async fn manual_submit_racing_expiry_records_once() {
    let h = Harness::new(exam(1));
    let session = h.session();
    session.start().unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    let outcome = session.submit().await.unwrap();
    settle().await;

    let attempts = h.recorder.attempts();
    assert_eq!(attempts.len(), 1);
    match outcome {
        SubmitOutcome::Submitted(record) => {
            assert_eq!(record.reason, SubmitReason::Manual);
            assert_eq!(attempts[0].id, record.id);
        }
        SubmitOutcome::AlreadyCompleted => {
            assert_eq!(attempts[0].reason, SubmitReason::TimeExpired);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn pause_stops_the_countdown() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    tokio::time::sleep(Duration::from_millis(5_500)).await;
    assert_eq!(session.remaining_secs(), 595);

    session.pause().unwrap();
    assert!(!session.answer("q1", "a").unwrap());
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(session.remaining_secs(), 595);
    assert!(session.submit().await.unwrap_err().is_invalid_state());

    session.unpause().unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(session.remaining_secs(), 592);
}

#[tokio::test(start_paused = true)]
async fn paused_session_stays_resumable() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();
    session.answer("q1", "a").unwrap();
    settle().await;
    session.pause().unwrap();
    settle().await;

    let stored = h.persistence.load_snapshot("rust-basics").await.unwrap();
    assert_eq!(stored.status, SessionStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn bookmarks_are_mirrored_to_the_recorder() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    assert!(session.toggle_bookmark("q2").unwrap());
    settle().await;
    assert!(session.is_bookmarked("q2"));
    assert_eq!(h.recorder.bookmark_ids(), vec!["q2".to_string()]);

    assert!(!session.toggle_bookmark("q2").unwrap());
    settle().await;
    assert!(h.recorder.bookmark_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn flags_toggle_and_survive_in_record() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    assert!(session.toggle_flag("q3").unwrap());
    assert!(session.toggle_flag("q1").unwrap());
    assert!(!session.toggle_flag("q1").unwrap());

    let SubmitOutcome::Submitted(record) = session.submit().await.unwrap() else {
        panic!("expected a submitted outcome");
    };
    assert_eq!(
        record.flagged_question_ids.into_iter().collect::<Vec<_>>(),
        vec!["q3".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn flush_waits_for_the_write() {
    let h = Harness::new(exam(10));
    let session = h.session();
    assert!(!session.flush().await);

    session.start().unwrap();
    session.answer("q3", "ownership").unwrap();
    session.pause().unwrap();
    assert!(session.flush().await);
    assert!(!session.is_dirty());

    let stored = h.persistence.load_snapshot("rust-basics").await.unwrap();
    assert_eq!(stored.status, SessionStatus::InProgress);
    assert_eq!(stored.answers.get("q3"), Some(&Answer::from("ownership")));

    h.backend.set_failing(true);
    assert!(!session.flush().await);
}

#[tokio::test(start_paused = true)]
async fn flush_waits_for_bookmark_writes() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();

    assert!(session.toggle_bookmark("q1").unwrap());
    assert!(session.flush().await);
    assert_eq!(h.recorder.bookmark_ids(), vec!["q1".to_string()]);

    assert!(!session.toggle_bookmark("q1").unwrap());
    assert!(session.flush().await);
    assert!(h.recorder.bookmark_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_pending_writes() {
    let h = Harness::new(exam(10));
    let session = h.session();
    session.start().unwrap();
    session.answer("q1", "a").unwrap();
    session.toggle_bookmark("q2").unwrap();

    session.shutdown().await;
    assert_eq!(h.recorder.bookmark_ids(), vec!["q2".to_string()]);
    let stored = h.persistence.load_snapshot("rust-basics").await.unwrap();
    assert_eq!(stored.answers.get("q1"), Some(&Answer::from("a")));
}

#[tokio::test(start_paused = true)]
async fn resume_rejects_finished_snapshots() {
    let h = Harness::new(exam(10));
    let first = h.session();
    first.start().unwrap();
    first.answer("q1", "a").unwrap();
    assert!(first.flush().await);
    first.shutdown().await;
    let mut snapshot = h.persistence.load_snapshot("rust-basics").await.unwrap();

    for status in [SessionStatus::Completed, SessionStatus::NotStarted] {
        snapshot.status = status;
        let second = h.session();
        let err = second.resume(&snapshot).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(second.status(), SessionStatus::NotStarted);
        assert_eq!(second.answer_for("q1"), None);
    }
}
