//! The `examforge history` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examforge_core::model::SubmitReason;

use super::{format_duration, AppContext};

pub async fn execute(exam: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = AppContext::load(config_path.as_deref())?;
    let attempts = match &exam {
        Some(exam_id) => ctx.stores.attempts.for_exam(exam_id).await,
        None => ctx.stores.attempts.all().await,
    };

    if attempts.is_empty() {
        println!("No attempts recorded.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Completed", "Exam", "Score", "%", "Correct", "Time", "Ended by"]);
    for a in &attempts {
        table.add_row(vec![
            Cell::new(a.completed_at.format("%Y-%m-%d %H:%M")),
            Cell::new(&a.exam_name),
            Cell::new(format!("{}/{}", a.totals.total_score, a.totals.max_score)),
            Cell::new(format!("{}%", a.totals.percentage)),
            Cell::new(format!("{}/{}", a.totals.correct_count, a.totals.total_questions)),
            Cell::new(format_duration(a.time_taken_secs)),
            Cell::new(match a.reason {
                SubmitReason::Manual => "submit",
                SubmitReason::TimeExpired => "timeout",
            }),
        ]);
    }
    println!("{table}");

    let stats = ctx.stores.attempts.stats().await;
    match exam.as_deref().and_then(|id| stats.per_exam.get(id)) {
        Some(per_exam) => println!(
            "\n{} attempt(s), average {:.1}%, best {}%, last {}%",
            per_exam.attempts,
            per_exam.average_percentage,
            per_exam.best_percentage,
            per_exam.last_percentage
        ),
        None => println!(
            "\n{} attempt(s), average {:.1}%, best {}%, total time {}",
            stats.total_attempts,
            stats.average_percentage,
            stats.best_percentage,
            format_duration(u32::try_from(stats.total_time_secs).unwrap_or(u32::MAX))
        ),
    }

    Ok(())
}
