//! The exam session state machine.
//!
//! Owns the live session state and orchestrates the timer, the auto-save
//! schedule, persistence, scoring and the attempt/bookmark recorders.
//!
//! ```text
//! NotStarted --start/resume--> InProgress --submit/expiry--> Completed
//!                               |      ^
//!                          pause|      |unpause
//!                               v      |
//!                               Paused-+
//! ```
//!
//! Mutations are synchronous and atomic behind a mutex; persistence runs in
//! spawned tasks so it never delays the caller or the countdown. Timer and
//! auto-save must run inside a tokio runtime.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::autosave::{spawn_autosave, AutoSave, AUTO_SAVE_INTERVAL};
use crate::error::{ExamError, StorageError};
use crate::events::{SessionEvent, EVENT_CHANNEL_CAPACITY};
use crate::model::{
    Answer, Answers, AttemptRecord, Bookmark, ExamDefinition, Question, QuestionKind,
    SessionSnapshot, SessionStatus, SubmitReason,
};
use crate::persistence::PersistenceLayer;
use crate::resume::{rehydrate, ResumeChoice, ResumeDecision, ResumeManager};
use crate::scoring;
use crate::timer::{self, spawn_countdown, Countdown, TimerEvent, TICK_INTERVAL};
use crate::traits::{AttemptRecorder, BookmarkRecorder, NoopRecorder};

/// Timing configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period of the automatic snapshot.
    pub auto_save_interval: Duration,
    /// Countdown resolution.
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_save_interval: AUTO_SAVE_INTERVAL,
            tick_interval: TICK_INTERVAL,
        }
    }
}

/// Collaborators a session writes to.
#[derive(Clone)]
pub struct SessionServices {
    pub persistence: Arc<PersistenceLayer>,
    pub attempts: Arc<dyn AttemptRecorder>,
    pub bookmarks: Arc<dyn BookmarkRecorder>,
}

impl SessionServices {
    /// Services that persist snapshots but drop attempts and bookmarks.
    pub fn snapshots_only(persistence: Arc<PersistenceLayer>) -> Self {
        Self {
            persistence,
            attempts: Arc::new(NoopRecorder),
            bookmarks: Arc::new(NoopRecorder),
        }
    }
}

/// Result of a submit call.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// This call completed the session and wrote the attempt record.
    Submitted(AttemptRecord),
    /// The session was already completed; nothing was done.
    AlreadyCompleted,
}

#[derive(Debug, Default)]
struct LiveState {
    status: SessionStatus,
    answers: Answers,
    current_index: usize,
    flagged: BTreeSet<String>,
    bookmarked: BTreeSet<String>,
    remaining_secs: u32,
    started_at: Option<DateTime<Utc>>,
    last_saved_at: Option<DateTime<Utc>>,
    /// Sequence of the latest mutation not yet known to be persisted.
    dirty_sequence: Option<u64>,
    workers: Option<CancellationToken>,
}

/// A single attempt at an exam.
pub struct ExamSession {
    exam: Arc<ExamDefinition>,
    services: SessionServices,
    config: SessionConfig,
    state: Mutex<LiveState>,
    events: broadcast::Sender<SessionEvent>,
    /// Background snapshot and bookmark writes.
    writes: TaskTracker,
    /// Serializes close/wait/reopen of `writes`.
    drain_lock: tokio::sync::Mutex<()>,
    this: Weak<ExamSession>,
}

impl ExamSession {
    pub fn new(
        exam: Arc<ExamDefinition>,
        services: SessionServices,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new_cyclic(|this| Self {
            exam,
            services,
            config,
            state: Mutex::new(LiveState::default()),
            events,
            writes: TaskTracker::new(),
            drain_lock: tokio::sync::Mutex::new(()),
            this: this.clone(),
        })
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn exam(&self) -> &ExamDefinition {
        &self.exam
    }

    /// Receive events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn remaining_secs(&self) -> u32 {
        self.lock().remaining_secs
    }

    pub fn current_index(&self) -> usize {
        self.lock().current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        let index = self.current_index();
        self.exam.questions.get(index)
    }

    pub fn answer_for(&self, question_id: &str) -> Option<Answer> {
        self.lock().answers.get(question_id).cloned()
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.lock().flagged.contains(question_id)
    }

    pub fn is_bookmarked(&self, question_id: &str) -> bool {
        self.lock().bookmarked.contains(question_id)
    }

    /// `true` if a mutation has not been confirmed persisted yet.
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty_sequence.is_some()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.lock().last_saved_at
    }

    /// Point-in-time snapshot of the live state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        self.snapshot_of(&state)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Look for an unfinished session of this exam, emitting
    /// `ResumeAvailable` when one exists.
    pub async fn check_resume(&self) -> ResumeDecision {
        let manager = ResumeManager::new(Arc::clone(&self.services.persistence));
        let decision = manager.inspect(&self.exam.id).await;
        if let ResumeDecision::Available(snapshot) = &decision {
            self.emit(SessionEvent::ResumeAvailable {
                snapshot: Box::new(snapshot.clone()),
            });
        }
        decision
    }

    /// Act on the caller's resume choice for `snapshot`.
    pub async fn apply_choice(
        &self,
        choice: ResumeChoice,
        snapshot: &SessionSnapshot,
    ) -> Result<(), ExamError> {
        match choice {
            ResumeChoice::Resume => self.resume(snapshot),
            ResumeChoice::StartNew => self.start_new().await,
        }
    }

    /// Start a fresh attempt with the full time limit.
    pub fn start(&self) -> Result<(), ExamError> {
        let snapshot = {
            let mut state = self.lock();
            if state.status != SessionStatus::NotStarted {
                return Err(ExamError::InvalidState {
                    operation: "start",
                    status: state.status,
                });
            }
            if self.exam.questions.is_empty() {
                return Err(ExamError::EmptyExam(self.exam.id.clone()));
            }

            state.status = SessionStatus::InProgress;
            state.remaining_secs = self.exam.time_limit_secs();
            state.started_at = Some(Utc::now());
            state.current_index = 0;
            self.start_workers(&mut state);
            self.snapshot_of(&state)
        };

        tracing::info!(
            exam_id = %self.exam.id,
            questions = self.exam.questions.len(),
            time_limit_secs = snapshot.remaining_time_secs,
            "session started"
        );
        self.write_through(snapshot);
        Ok(())
    }

    /// Discard any stored snapshot, then start fresh.
    pub async fn start_new(&self) -> Result<(), ExamError> {
        {
            let state = self.lock();
            if state.status != SessionStatus::NotStarted {
                return Err(ExamError::InvalidState {
                    operation: "start",
                    status: state.status,
                });
            }
        }
        let manager = ResumeManager::new(Arc::clone(&self.services.persistence));
        if !manager.discard(&self.exam.id).await {
            self.emit(SessionEvent::SaveFailed {
                reason: "could not discard previous session".into(),
            });
        }
        self.start()
    }

    /// Continue from a stored snapshot.
    pub fn resume(&self, snapshot: &SessionSnapshot) -> Result<(), ExamError> {
        if snapshot.status != SessionStatus::InProgress {
            return Err(ExamError::InvalidState {
                operation: "resume",
                status: snapshot.status,
            });
        }
        let restored = rehydrate(&self.exam, snapshot)?;
        let mut state = self.lock();
        if state.status != SessionStatus::NotStarted {
            return Err(ExamError::InvalidState {
                operation: "resume",
                status: state.status,
            });
        }
        if self.exam.questions.is_empty() {
            return Err(ExamError::EmptyExam(self.exam.id.clone()));
        }

        state.answers = restored.answers;
        state.current_index = restored.current_index;
        state.flagged = restored.flagged;
        state.bookmarked = restored.bookmarked;
        state.remaining_secs = restored.remaining_secs;
        state.started_at = snapshot.started_at;
        state.last_saved_at = Some(snapshot.last_saved_at);
        state.status = SessionStatus::InProgress;
        self.start_workers(&mut state);

        tracing::info!(
            exam_id = %self.exam.id,
            remaining_secs = state.remaining_secs,
            answered = state.answers.len(),
            "session resumed"
        );
        Ok(())
    }

    /// Suspend the countdown and auto-save.
    pub fn pause(&self) -> Result<(), ExamError> {
        let mut state = self.lock();
        match state.status {
            SessionStatus::InProgress => {}
            SessionStatus::Paused => return Ok(()),
            status => {
                return Err(ExamError::InvalidState {
                    operation: "pause",
                    status,
                })
            }
        }
        state.status = SessionStatus::Paused;
        if let Some(token) = state.workers.take() {
            token.cancel();
        }
        tracing::info!(exam_id = %self.exam.id, remaining_secs = state.remaining_secs, "session paused");
        Ok(())
    }

    /// Leave the paused state and restart the countdown and auto-save.
    pub fn unpause(&self) -> Result<(), ExamError> {
        let mut state = self.lock();
        match state.status {
            SessionStatus::Paused => {}
            SessionStatus::InProgress => return Ok(()),
            status => {
                return Err(ExamError::InvalidState {
                    operation: "unpause",
                    status,
                })
            }
        }
        state.status = SessionStatus::InProgress;
        self.start_workers(&mut state);
        tracing::info!(exam_id = %self.exam.id, "session unpaused");
        Ok(())
    }

    /// Wait for pending background writes, then persist the live state and
    /// wait for that write too. Returns `false` if the session is not
    /// running or every tier failed.
    ///
    /// A paused session is stored as in progress so it stays resumable.
    pub async fn flush(&self) -> bool {
        self.drain_writes().await;
        let mut snapshot = {
            let state = self.lock();
            match state.status {
                SessionStatus::InProgress | SessionStatus::Paused => self.snapshot_of(&state),
                _ => return false,
            }
        };
        snapshot.status = SessionStatus::InProgress;

        match self.services.persistence.save_snapshot(&snapshot).await {
            Ok(()) => {
                self.mark_saved(&snapshot);
                true
            }
            Err(e) => {
                self.emit(SessionEvent::SaveFailed {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    /// Tear down the timer and auto-save without changing status.
    pub fn stop(&self) {
        if let Some(token) = self.lock().workers.take() {
            token.cancel();
            tracing::debug!(exam_id = %self.exam.id, "session workers stopped");
        }
    }

    /// Stop the workers and wait for every background write to land.
    pub async fn shutdown(&self) {
        self.stop();
        let _guard = self.drain_lock.lock().await;
        self.writes.close();
        self.writes.wait().await;
        tracing::debug!(exam_id = %self.exam.id, "session shut down");
    }

    async fn drain_writes(&self) {
        let _guard = self.drain_lock.lock().await;
        if self.writes.is_closed() {
            self.writes.wait().await;
            return;
        }
        self.writes.close();
        self.writes.wait().await;
        self.writes.reopen();
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Record an answer for `question_id`.
    ///
    /// Single-select and text questions replace the answer; multi-select
    /// toggles `value` in the selected set. Returns `false` (no-op) unless
    /// the session is in progress.
    pub fn answer(&self, question_id: &str, value: &str) -> Result<bool, ExamError> {
        let question = self.question(question_id)?;
        let snapshot = {
            let mut state = self.lock();
            match state.status {
                SessionStatus::InProgress => {}
                SessionStatus::Completed => {
                    return Err(ExamError::InvalidState {
                        operation: "answer",
                        status: SessionStatus::Completed,
                    })
                }
                _ => return Ok(false),
            }

            match question.kind {
                QuestionKind::MultiSelect => {
                    toggle_choice(&mut state.answers, question_id, value);
                }
                QuestionKind::SingleSelect | QuestionKind::Text => {
                    state
                        .answers
                        .insert(question_id.to_string(), Answer::Value(value.to_string()));
                }
            }
            self.snapshot_of(&state)
        };

        self.mark_dirty(snapshot.sequence);
        self.write_through(snapshot);
        Ok(true)
    }

    /// Move to question `index`, clamped to the exam's bounds.
    pub fn navigate(&self, index: usize) -> Result<usize, ExamError> {
        let mut state = self.lock();
        match state.status {
            SessionStatus::InProgress | SessionStatus::Paused => {}
            SessionStatus::Completed => {
                return Err(ExamError::InvalidState {
                    operation: "navigate",
                    status: SessionStatus::Completed,
                })
            }
            SessionStatus::NotStarted => return Ok(state.current_index),
        }
        state.current_index = index.min(self.exam.questions.len().saturating_sub(1));
        Ok(state.current_index)
    }

    pub fn next(&self) -> Result<usize, ExamError> {
        let index = self.current_index();
        self.navigate(index.saturating_add(1))
    }

    pub fn previous(&self) -> Result<usize, ExamError> {
        let index = self.current_index();
        self.navigate(index.saturating_sub(1))
    }

    /// Toggle the review flag on a question. Returns the new flag state.
    pub fn toggle_flag(&self, question_id: &str) -> Result<bool, ExamError> {
        self.question(question_id)?;
        let mut state = self.lock();
        self.ensure_mutable(&state, "flag")?;
        if state.status != SessionStatus::InProgress {
            return Ok(state.flagged.contains(question_id));
        }
        Ok(toggle(&mut state.flagged, question_id))
    }

    /// Toggle the bookmark on a question and mirror it to the bookmark store.
    /// Returns the new bookmark state.
    pub fn toggle_bookmark(&self, question_id: &str) -> Result<bool, ExamError> {
        let question = self.question(question_id)?.clone();
        let bookmarked = {
            let mut state = self.lock();
            self.ensure_mutable(&state, "bookmark")?;
            if state.status != SessionStatus::InProgress {
                return Ok(state.bookmarked.contains(question_id));
            }
            toggle(&mut state.bookmarked, question_id)
        };

        let recorder = Arc::clone(&self.services.bookmarks);
        let events = self.events.clone();
        let exam = Arc::clone(&self.exam);
        self.spawn_write(async move {
            let result = if bookmarked {
                recorder
                    .add_bookmark(Bookmark::new(&exam, &question, ""))
                    .await
            } else {
                recorder.remove_bookmark(&question.id, &exam.id).await
            };
            if let Err(e) = result {
                tracing::warn!(question_id = %question.id, "bookmark update failed: {e}");
                let _ = events.send(SessionEvent::SaveFailed {
                    reason: format!("bookmark not saved: {e}"),
                });
            }
        });
        Ok(bookmarked)
    }

    /// Submit the session for scoring.
    ///
    /// Only the first caller to observe `InProgress` completes the session;
    /// any later call (manual or timer) gets `AlreadyCompleted`.
    pub async fn submit(&self) -> Result<SubmitOutcome, ExamError> {
        self.finish(SubmitReason::Manual).await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, LiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        tracing::debug!(exam_id = %self.exam.id, event = event.kind(), "session event");
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn question(&self, question_id: &str) -> Result<&Question, ExamError> {
        self.exam
            .question(question_id)
            .ok_or_else(|| ExamError::UnknownQuestion(question_id.to_string()))
    }

    fn ensure_mutable(&self, state: &LiveState, operation: &'static str) -> Result<(), ExamError> {
        if state.status == SessionStatus::Completed {
            return Err(ExamError::InvalidState {
                operation,
                status: SessionStatus::Completed,
            });
        }
        Ok(())
    }

    fn snapshot_of(&self, state: &LiveState) -> SessionSnapshot {
        SessionSnapshot {
            exam_id: self.exam.id.clone(),
            answers: state.answers.clone(),
            current_question_index: state.current_index,
            flagged_question_ids: state.flagged.clone(),
            bookmarked_question_ids: state.bookmarked.clone(),
            remaining_time_secs: state.remaining_secs,
            status: state.status,
            last_saved_at: Utc::now(),
            started_at: state.started_at,
            sequence: self.services.persistence.next_sequence(),
        }
    }

    fn start_workers(&self, state: &mut LiveState) {
        if tokio::runtime::Handle::try_current().is_err() {
            tracing::error!(exam_id = %self.exam.id, "no tokio runtime; timer and auto-save not started");
            return;
        }
        let token = CancellationToken::new();
        spawn_countdown(self.this.clone(), self.config.tick_interval, token.clone());
        spawn_autosave(self.this.clone(), self.config.auto_save_interval, token.clone());
        if let Some(previous) = state.workers.replace(token) {
            previous.cancel();
        }
    }

    fn mark_dirty(&self, sequence: u64) {
        let mut state = self.lock();
        if state.dirty_sequence.map_or(true, |s| s < sequence) {
            state.dirty_sequence = Some(sequence);
        }
    }

    fn mark_saved(&self, snapshot: &SessionSnapshot) {
        let mut state = self.lock();
        if state.dirty_sequence.is_some_and(|s| s <= snapshot.sequence) {
            state.dirty_sequence = None;
        }
        state.last_saved_at = Some(snapshot.last_saved_at);
    }

    /// Track a background write on the current runtime, or log and drop it
    /// if there is none.
    fn spawn_write<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.writes.spawn_on(future, &handle);
            }
            Err(_) => tracing::warn!(exam_id = %self.exam.id, "no tokio runtime; background write skipped"),
        }
    }

    /// Snapshot write in the background; `flush` and `shutdown` wait for it.
    fn write_through(&self, snapshot: SessionSnapshot) {
        let persistence = Arc::clone(&self.services.persistence);
        let events = self.events.clone();
        let this = self.this.clone();
        self.spawn_write(async move {
            match persistence.save_snapshot(&snapshot).await {
                Ok(()) => {
                    if let Some(session) = this.upgrade() {
                        session.mark_saved(&snapshot);
                    }
                }
                Err(StorageError::Stale { .. }) => {}
                Err(e) => {
                    let _ = events.send(SessionEvent::SaveFailed {
                        reason: e.to_string(),
                    });
                }
            }
        });
    }

    async fn finish(&self, reason: SubmitReason) -> Result<SubmitOutcome, ExamError> {
        let snapshot = {
            let mut state = self.lock();
            match state.status {
                SessionStatus::InProgress => {}
                SessionStatus::Completed => return Ok(SubmitOutcome::AlreadyCompleted),
                status => {
                    return Err(ExamError::InvalidState {
                        operation: "submit",
                        status,
                    })
                }
            }
            state.status = SessionStatus::Completed;
            if let Some(token) = state.workers.take() {
                token.cancel();
            }
            self.snapshot_of(&state)
        };

        let totals = scoring::score(&self.exam, &snapshot.answers);
        let record = AttemptRecord {
            id: Uuid::new_v4(),
            exam_id: self.exam.id.clone(),
            exam_name: self.exam.name.clone(),
            totals,
            time_taken_secs: self
                .exam
                .time_limit_secs()
                .saturating_sub(snapshot.remaining_time_secs),
            answers: snapshot.answers.clone(),
            flagged_question_ids: snapshot.flagged_question_ids.clone(),
            completed_at: Utc::now(),
            reason,
        };

        if let Err(e) = self.services.attempts.record_attempt(&record).await {
            tracing::error!(exam_id = %self.exam.id, attempt_id = %record.id, "attempt not recorded: {e}");
            self.emit(SessionEvent::SaveFailed {
                reason: format!("attempt not recorded: {e}"),
            });
        }

        // The completed snapshot supersedes any in-flight write, so a failed
        // clear still leaves nothing resumable behind.
        let persistence = &self.services.persistence;
        if let Err(e) = persistence.save_snapshot(&snapshot).await {
            tracing::debug!(exam_id = %self.exam.id, "completed snapshot not saved: {e}");
        }
        if !persistence.clear_snapshot(&self.exam.id).await {
            self.emit(SessionEvent::SaveFailed {
                reason: "could not clear saved session".into(),
            });
        }
        {
            let mut state = self.lock();
            state.dirty_sequence = None;
        }

        tracing::info!(
            exam_id = %self.exam.id,
            attempt_id = %record.id,
            score = totals.total_score,
            max_score = totals.max_score,
            percentage = totals.percentage,
            ?reason,
            "session submitted"
        );
        self.emit(SessionEvent::Submitted {
            attempt_id: record.id,
            percentage: totals.percentage,
            reason,
        });
        Ok(SubmitOutcome::Submitted(record))
    }
}

#[async_trait]
impl Countdown for ExamSession {
    async fn on_tick(&self, elapsed_secs: u32) -> bool {
        let tick = {
            let mut state = self.lock();
            if state.status != SessionStatus::InProgress {
                return false;
            }
            let tick = timer::advance(state.remaining_secs, elapsed_secs);
            state.remaining_secs = tick.remaining;
            tick
        };

        for event in &tick.events {
            match event {
                TimerEvent::TimeWarning => self.emit(SessionEvent::TimeWarning {
                    remaining_secs: tick.remaining,
                }),
                TimerEvent::FinalWarning => self.emit(SessionEvent::FinalWarning {
                    remaining_secs: tick.remaining,
                }),
                TimerEvent::Expired => self.emit(SessionEvent::Expired),
            }
        }

        if tick.expired() {
            tracing::info!(exam_id = %self.exam.id, "time expired, submitting");
            if let Err(e) = self.finish(SubmitReason::TimeExpired).await {
                tracing::warn!(exam_id = %self.exam.id, "automatic submit failed: {e}");
            }
            return false;
        }
        true
    }
}

#[async_trait]
impl AutoSave for ExamSession {
    async fn auto_save(&self) -> bool {
        let snapshot = {
            let state = self.lock();
            if state.status != SessionStatus::InProgress {
                return false;
            }
            self.snapshot_of(&state)
        };

        match self.services.persistence.save_snapshot(&snapshot).await {
            Ok(()) => {
                self.mark_saved(&snapshot);
                self.emit(SessionEvent::AutoSaved {
                    at: snapshot.last_saved_at,
                });
            }
            Err(StorageError::Stale { .. }) => {}
            Err(e) => self.emit(SessionEvent::SaveFailed {
                reason: e.to_string(),
            }),
        }
        true
    }
}

impl Drop for ExamSession {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = state.workers.take() {
            token.cancel();
        }
    }
}

/// Toggle membership of `value`, returning `true` if it is now present.
fn toggle(set: &mut BTreeSet<String>, value: &str) -> bool {
    if set.remove(value) {
        false
    } else {
        set.insert(value.to_string());
        true
    }
}

/// Toggle `value` in a multi-select answer. An emptied set removes the answer.
fn toggle_choice(answers: &mut Answers, question_id: &str, value: &str) {
    let mut selected = match answers.remove(question_id) {
        Some(Answer::Set(ids)) => ids,
        _ => BTreeSet::new(),
    };
    toggle(&mut selected, value);
    if !selected.is_empty() {
        answers.insert(question_id.to_string(), Answer::Set(selected));
    }
}
