//! Exam catalog: parsing, validation and lookup of exam definitions.
//!
//! Exam files are TOML or JSON. They are parsed into loose intermediate
//! structs and validated into [`ExamDefinition`] here, so nothing
//! malformed reaches a session.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExamError;
use crate::model::{
    default_points, Difficulty, ExamDefinition, Question, QuestionKind, QuestionOption,
};
use crate::traits::ExamCatalog;

/// Intermediate structure for exam files.
#[derive(Debug, Deserialize)]
struct RawExamFile {
    exam: RawExamHeader,
    #[serde(default)]
    questions: Vec<RawQuestion>,
}

#[derive(Debug, Deserialize)]
struct RawExamHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_time_limit", alias = "time_limit")]
    time_limit_minutes: u32,
}

fn default_time_limit() -> u32 {
    30
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    id: String,
    #[serde(alias = "question")]
    title: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: Vec<RawOption>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default = "default_points")]
    points: u32,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    hint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    id: String,
    #[serde(alias = "text")]
    label: String,
    #[serde(default, alias = "correct")]
    is_correct: bool,
}

/// File formats an exam can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamFormat {
    Toml,
    Json,
}

impl ExamFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(ExamFormat::Toml),
            "json" => Some(ExamFormat::Json),
            _ => None,
        }
    }
}

/// Parse a single exam file.
pub fn parse_exam_file(path: &Path) -> Result<ExamDefinition> {
    let format = ExamFormat::from_path(path)
        .with_context(|| format!("unsupported exam file: {}", path.display()))?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam file: {}", path.display()))?;
    parse_exam_str(&content, format)
        .with_context(|| format!("invalid exam file: {}", path.display()))
}

/// Parse and validate exam content (useful for testing).
pub fn parse_exam_str(content: &str, format: ExamFormat) -> Result<ExamDefinition> {
    let raw: RawExamFile = match format {
        ExamFormat::Toml => toml::from_str(content).context("failed to parse TOML")?,
        ExamFormat::Json => serde_json::from_str(content).context("failed to parse JSON")?,
    };
    build_exam(raw)
}

fn build_exam(raw: RawExamFile) -> Result<ExamDefinition> {
    anyhow::ensure!(!raw.exam.id.trim().is_empty(), "exam id is empty");
    anyhow::ensure!(
        raw.exam.time_limit_minutes > 0,
        "exam '{}' has a zero time limit",
        raw.exam.id
    );
    anyhow::ensure!(
        !raw.questions.is_empty(),
        "exam '{}' has no questions",
        raw.exam.id
    );

    let mut seen = HashSet::new();
    let questions = raw
        .questions
        .into_iter()
        .map(|q| {
            anyhow::ensure!(seen.insert(q.id.clone()), "duplicate question id '{}'", q.id);
            build_question(q)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ExamDefinition {
        id: raw.exam.id,
        name: raw.exam.name,
        description: raw.exam.description,
        time_limit_minutes: raw.exam.time_limit_minutes,
        questions,
    })
}

fn build_question(raw: RawQuestion) -> Result<Question> {
    let kind: QuestionKind = raw
        .kind
        .parse()
        .map_err(|e: String| anyhow::anyhow!("question '{}': {e}", raw.id))?;
    let difficulty = raw
        .difficulty
        .map(|d| d.parse::<Difficulty>())
        .transpose()
        .map_err(|e: String| anyhow::anyhow!("question '{}': {e}", raw.id))?
        .unwrap_or_default();

    let options: Vec<QuestionOption> = raw
        .options
        .into_iter()
        .map(|o| QuestionOption {
            id: o.id,
            label: o.label,
            is_correct: o.is_correct,
        })
        .collect();

    let mut option_ids = HashSet::new();
    for o in &options {
        anyhow::ensure!(
            option_ids.insert(o.id.as_str()),
            "question '{}': duplicate option id '{}'",
            raw.id,
            o.id
        );
    }

    let correct = options.iter().filter(|o| o.is_correct).count();
    match kind {
        QuestionKind::SingleSelect => {
            anyhow::ensure!(
                options.len() >= 2,
                "question '{}': single-select needs at least two options",
                raw.id
            );
            anyhow::ensure!(
                correct == 1,
                "question '{}': single-select needs exactly one correct option, found {correct}",
                raw.id
            );
        }
        QuestionKind::MultiSelect => {
            anyhow::ensure!(
                options.len() >= 2,
                "question '{}': multi-select needs at least two options",
                raw.id
            );
            anyhow::ensure!(
                correct >= 1,
                "question '{}': multi-select needs at least one correct option",
                raw.id
            );
        }
        QuestionKind::Text => {
            anyhow::ensure!(
                raw.correct_answer
                    .as_deref()
                    .is_some_and(|a| !a.trim().is_empty()),
                "question '{}': text question needs a correct_answer",
                raw.id
            );
        }
    }

    Ok(Question {
        id: raw.id,
        title: raw.title,
        kind,
        options,
        correct_answer: raw.correct_answer,
        points: raw.points,
        difficulty,
        tags: raw.tags,
        hint: raw.hint,
    })
}

/// Recursively load every exam file in a directory.
///
/// Files that fail to parse are skipped with a warning.
pub fn load_exam_directory(dir: &Path) -> Result<Vec<ExamDefinition>> {
    let mut exams = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            exams.extend(load_exam_directory(&path)?);
        } else if ExamFormat::from_path(&path).is_some() {
            match parse_exam_file(&path) {
                Ok(exam) => exams.push(exam),
                Err(e) => {
                    tracing::warn!("skipping {}: {e:#}", path.display());
                }
            }
        }
    }

    Ok(exams)
}

/// A non-fatal issue found in an exam.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub question_id: Option<String>,
    pub message: String,
}

/// Check an exam for issues that do not prevent taking it.
pub fn validate_exam(exam: &ExamDefinition) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if exam.description.trim().is_empty() {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "exam has no description".into(),
        });
    }
    if exam.max_score() == 0 {
        warnings.push(ValidationWarning {
            question_id: None,
            message: "exam is worth zero points".into(),
        });
    }

    for q in &exam.questions {
        let warn = |message: String| ValidationWarning {
            question_id: Some(q.id.clone()),
            message,
        };
        if q.points == 0 {
            warnings.push(warn("question is worth zero points".into()));
        }
        if q.hint.is_none() {
            warnings.push(warn("no hint".into()));
        }
        if q.kind == QuestionKind::Text && !q.options.is_empty() {
            warnings.push(warn("text question has options; they are ignored".into()));
        }
        if q.kind != QuestionKind::Text && q.correct_answer.is_some() {
            warnings.push(warn(
                "select question has a correct_answer; it is ignored".into(),
            ));
        }
        let mut tags = HashSet::new();
        for tag in &q.tags {
            if !tags.insert(tag.as_str()) {
                warnings.push(warn(format!("duplicate tag '{tag}'")));
            }
        }
    }

    warnings
}

// ---------------------------------------------------------------------------
// Catalog implementations
// ---------------------------------------------------------------------------

/// Catalog over a fixed set of exams.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    exams: BTreeMap<String, ExamDefinition>,
}

impl StaticCatalog {
    pub fn new(exams: impl IntoIterator<Item = ExamDefinition>) -> Self {
        Self {
            exams: exams.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.exams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exams.is_empty()
    }
}

#[async_trait]
impl ExamCatalog for StaticCatalog {
    async fn get_exam_by_id(&self, id: &str) -> Result<ExamDefinition, ExamError> {
        self.exams
            .get(id)
            .cloned()
            .ok_or_else(|| ExamError::load(id, "exam not found"))
    }

    async fn list_exams(&self) -> Result<Vec<(String, String)>, ExamError> {
        Ok(self
            .exams
            .values()
            .map(|e| (e.id.clone(), e.name.clone()))
            .collect())
    }
}

/// Catalog that reads exam files from a directory on every lookup.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    dir: PathBuf,
}

impl FileCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_all(&self) -> Result<Vec<ExamDefinition>, ExamError> {
        load_exam_directory(&self.dir)
            .map_err(|e| ExamError::load("*", format!("{e:#}")))
    }
}

#[async_trait]
impl ExamCatalog for FileCatalog {
    async fn get_exam_by_id(&self, id: &str) -> Result<ExamDefinition, ExamError> {
        self.load_all()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| {
                ExamError::load(id, format!("exam not found in {}", self.dir.display()))
            })
    }

    async fn list_exams(&self) -> Result<Vec<(String, String)>, ExamError> {
        Ok(self
            .load_all()?
            .into_iter()
            .map(|e| (e.id, e.name))
            .collect())
    }
}
