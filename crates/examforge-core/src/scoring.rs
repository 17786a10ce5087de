//! Deterministic scoring of a set of answers against an exam definition.
//!
//! Scoring is all-or-nothing per question: no partial credit for
//! multi-select, and unanswered questions simply count as incorrect.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::{Answer, Answers, ExamDefinition, Question, QuestionKind, ScoreSummary};

/// Per-question grading outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: String,
    pub answered: bool,
    pub correct: bool,
    pub points_awarded: u32,
    pub points_possible: u32,
}

/// Grade a single question.
pub fn grade(question: &Question, answer: Option<&Answer>) -> QuestionResult {
    let correct = answer.is_some_and(|a| is_correct(question, a));
    QuestionResult {
        question_id: question.id.clone(),
        answered: answer.is_some(),
        correct,
        points_awarded: if correct { question.points } else { 0 },
        points_possible: question.points,
    }
}

/// Returns `true` if `answer` is a fully correct answer to `question`.
///
/// An answer of the wrong shape for the question kind (a set for a
/// single-select, say) is incorrect rather than an error.
pub fn is_correct(question: &Question, answer: &Answer) -> bool {
    match (question.kind, answer) {
        (QuestionKind::SingleSelect, Answer::Value(id)) => {
            let correct = question.correct_option_ids();
            correct.len() == 1 && correct.contains(id.as_str())
        }
        (QuestionKind::MultiSelect, Answer::Set(ids)) => {
            let given: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
            given == question.correct_option_ids()
        }
        (QuestionKind::Text, Answer::Value(text)) => question
            .correct_answer
            .as_deref()
            .is_some_and(|expected| normalize(expected) == normalize(text)),
        _ => false,
    }
}

fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Score a full set of answers.
pub fn score(exam: &ExamDefinition, answers: &Answers) -> ScoreSummary {
    let results: Vec<QuestionResult> = exam
        .questions
        .iter()
        .map(|q| grade(q, answers.get(&q.id)))
        .collect();
    summarize(&results)
}

/// Per-question breakdown in exam order.
pub fn breakdown(exam: &ExamDefinition, answers: &Answers) -> Vec<QuestionResult> {
    exam.questions
        .iter()
        .map(|q| grade(q, answers.get(&q.id)))
        .collect()
}

/// Fold per-question results into totals.
pub fn summarize(results: &[QuestionResult]) -> ScoreSummary {
    let max_score: u32 = results.iter().map(|r| r.points_possible).sum();
    let total_score: u32 = results.iter().map(|r| r.points_awarded).sum();
    let correct_count = results.iter().filter(|r| r.correct).count() as u32;
    let total_questions = results.len() as u32;

    ScoreSummary {
        total_score,
        max_score,
        correct_count,
        total_questions,
        percentage: rounded_percent(total_score, max_score),
        accuracy: rounded_percent(correct_count, total_questions),
    }
}

/// `round(100 * part / whole)` with halves rounded up; 0 when `whole == 0`.
pub fn rounded_percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    let (part, whole) = (part as u64, whole as u64);
    ((200 * part + whole) / (2 * whole)) as u32
}
