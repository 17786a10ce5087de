//! Aggregate statistics over attempt history.
//!
//! Always computed from the live collection so the numbers stay consistent
//! after eviction, import or clearing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AttemptRecord;

/// Statistics across every stored attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_attempts: usize,
    /// Mean percentage, rounded to one decimal.
    pub average_percentage: f64,
    pub best_percentage: u32,
    pub total_time_secs: u64,
    pub per_exam: BTreeMap<String, ExamStats>,
}

/// Statistics for the attempts at one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamStats {
    pub exam_id: String,
    pub exam_name: String,
    pub attempts: usize,
    pub average_percentage: f64,
    pub best_percentage: u32,
    pub last_percentage: u32,
    pub last_completed_at: DateTime<Utc>,
}

/// Compute statistics from a most-recent-first attempt list.
pub fn history_stats(attempts: &[AttemptRecord]) -> HistoryStats {
    if attempts.is_empty() {
        return HistoryStats::default();
    }

    let mut grouped: BTreeMap<&str, Vec<&AttemptRecord>> = BTreeMap::new();
    for a in attempts {
        grouped.entry(a.exam_id.as_str()).or_default().push(a);
    }

    let per_exam = grouped
        .into_iter()
        .map(|(exam_id, group)| {
            // Most-recent-first order is not guaranteed after an import.
            let latest = group
                .iter()
                .max_by_key(|a| a.completed_at)
                .copied()
                .unwrap_or(group[0]);
            let stats = ExamStats {
                exam_id: exam_id.to_string(),
                exam_name: latest.exam_name.clone(),
                attempts: group.len(),
                average_percentage: average(group.iter().map(|a| a.totals.percentage)),
                best_percentage: group
                    .iter()
                    .map(|a| a.totals.percentage)
                    .max()
                    .unwrap_or(0),
                last_percentage: latest.totals.percentage,
                last_completed_at: latest.completed_at,
            };
            (exam_id.to_string(), stats)
        })
        .collect();

    HistoryStats {
        total_attempts: attempts.len(),
        average_percentage: average(attempts.iter().map(|a| a.totals.percentage)),
        best_percentage: attempts
            .iter()
            .map(|a| a.totals.percentage)
            .max()
            .unwrap_or(0),
        total_time_secs: attempts.iter().map(|a| a.time_taken_secs as u64).sum(),
        per_exam,
    }
}

fn average(values: impl Iterator<Item = u32>) -> f64 {
    let (sum, count) = values.fold((0u64, 0u64), |(s, c), v| (s + v as u64, c + 1));
    if count == 0 {
        return 0.0;
    }
    let mean = sum as f64 / count as f64;
    (mean * 10.0).round() / 10.0
}
