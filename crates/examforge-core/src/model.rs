//! Core data model types for examforge.
//!
//! These are the types every other crate in the workspace shares: exam
//! definitions, live-session snapshots, attempt records and bookmarks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable exam definition supplied by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamDefinition {
    /// Unique identifier for this exam.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Description shown before the exam starts.
    #[serde(default)]
    pub description: String,
    /// Time limit in minutes.
    pub time_limit_minutes: u32,
    /// Questions in presentation order.
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl ExamDefinition {
    /// Time limit in seconds.
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_minutes.saturating_mul(60)
    }

    /// Look up a question by id.
    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Sum of points over all questions.
    pub fn max_score(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }
}

/// A single exam question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    /// Options for select questions; empty for text questions.
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    /// Canonical answer for text questions.
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

impl Question {
    /// Ids of all options flagged correct.
    pub fn correct_option_ids(&self) -> BTreeSet<&str> {
        self.options
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id.as_str())
            .collect()
    }

    pub fn has_option(&self, id: &str) -> bool {
        self.options.iter().any(|o| o.id == id)
    }
}

pub(crate) fn default_points() -> u32 {
    1
}

/// A selectable option of a select question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleSelect,
    MultiSelect,
    Text,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleSelect => write!(f, "single_select"),
            QuestionKind::MultiSelect => write!(f, "multi_select"),
            QuestionKind::Text => write!(f, "text"),
        }
    }
}

impl FromStr for QuestionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "single_select" | "single" | "singleselect" => Ok(QuestionKind::SingleSelect),
            "multi_select" | "multiple" | "multi" | "multiselect" => Ok(QuestionKind::MultiSelect),
            "text" | "free_text" => Ok(QuestionKind::Text),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// Question difficulty. Informational only; it never affects scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// A recorded answer.
///
/// Single-select option ids and free text are stored as `Value`;
/// multi-select option ids as `Set`. Serialized as a bare string or array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Value(String),
    Set(BTreeSet<String>),
}

impl Answer {
    /// Build a set answer from option ids.
    pub fn set<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Answer::Set(ids.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for Answer {
    fn from(value: &str) -> Self {
        Answer::Value(value.to_string())
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::Value(v) => write!(f, "{v}"),
            Answer::Set(ids) => {
                let joined: Vec<&str> = ids.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
        }
    }
}

/// Answers keyed by question id.
pub type Answers = BTreeMap<String, Answer>;

/// Lifecycle status of an exam session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    NotStarted,
    InProgress,
    Paused,
    Completed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::NotStarted => write!(f, "not started"),
            SessionStatus::InProgress => write!(f, "in progress"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Full point-in-time serialization of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub exam_id: String,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub current_question_index: usize,
    #[serde(default)]
    pub flagged_question_ids: BTreeSet<String>,
    #[serde(default)]
    pub bookmarked_question_ids: BTreeSet<String>,
    pub remaining_time_secs: u32,
    pub status: SessionStatus,
    pub last_saved_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Monotonic write sequence assigned by the persistence layer.
    #[serde(default)]
    pub sequence: u64,
}

/// Persistence key of the snapshot for an exam.
pub fn snapshot_key(exam_id: &str) -> String {
    format!("exam_session_{exam_id}")
}

/// Totals produced by the scoring engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_score: u32,
    pub max_score: u32,
    pub correct_count: u32,
    pub total_questions: u32,
    /// `round(100 * total_score / max_score)`, 0 when `max_score == 0`.
    pub percentage: u32,
    /// `round(100 * correct_count / total_questions)`, 0 when there are no questions.
    pub accuracy: u32,
}

/// Why a session was submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitReason {
    #[default]
    Manual,
    TimeExpired,
}

/// Immutable record of a finished attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub exam_id: String,
    pub exam_name: String,
    pub totals: ScoreSummary,
    pub time_taken_secs: u32,
    pub answers: Answers,
    #[serde(default)]
    pub flagged_question_ids: BTreeSet<String>,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: SubmitReason,
}

/// A bookmarked question, keyed by `(question_id, exam_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub question_id: String,
    pub exam_id: String,
    #[serde(default)]
    pub exam_name: String,
    /// Copy of the question at the time it was bookmarked.
    pub question: Question,
    #[serde(default)]
    pub note: String,
    pub created_at: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(exam: &ExamDefinition, question: &Question, note: impl Into<String>) -> Self {
        Self {
            question_id: question.id.clone(),
            exam_id: exam.id.clone(),
            exam_name: exam.name.clone(),
            question: question.clone(),
            note: note.into(),
            created_at: Utc::now(),
        }
    }

    pub fn same_key(&self, question_id: &str, exam_id: &str) -> bool {
        self.question_id == question_id && self.exam_id == exam_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_kind_display_and_parse() {
        assert_eq!(QuestionKind::SingleSelect.to_string(), "single_select");
        assert_eq!(
            "multi-select".parse::<QuestionKind>().unwrap(),
            QuestionKind::MultiSelect
        );
        assert_eq!(
            "single".parse::<QuestionKind>().unwrap(),
            QuestionKind::SingleSelect
        );
        assert_eq!("TEXT".parse::<QuestionKind>().unwrap(), QuestionKind::Text);
        assert!("essay".parse::<QuestionKind>().is_err());
    }

    #[test]
    fn answer_serializes_untagged() {
        let single = serde_json::to_string(&Answer::from("a")).unwrap();
        assert_eq!(single, "\"a\"");

        let multi = serde_json::to_string(&Answer::set(["b", "a"])).unwrap();
        assert_eq!(multi, "[\"a\",\"b\"]");

        let parsed: Answer = serde_json::from_str("[\"x\"]").unwrap();
        assert_eq!(parsed, Answer::set(["x"]));
    }

    #[test]
    fn snapshot_defaults_missing_fields() {
        let json = r#"{
            "exam_id": "rust-101",
            "remaining_time_secs": 120,
            "status": "in_progress",
            "last_saved_at": "2024-01-01T00:00:00Z"
        }"#;
        let snap: SessionSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.status, SessionStatus::InProgress);
        assert!(snap.answers.is_empty());
        assert_eq!(snap.sequence, 0);
        assert_eq!(snap.current_question_index, 0);
    }

    #[test]
    fn time_limit_in_seconds() {
        let exam = ExamDefinition {
            id: "e".into(),
            name: "E".into(),
            description: String::new(),
            time_limit_minutes: 45,
            questions: vec![],
        };
        assert_eq!(exam.time_limit_secs(), 2700);
        assert_eq!(snapshot_key("e"), "exam_session_e");
    }
}
