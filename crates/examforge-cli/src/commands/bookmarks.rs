//! The `examforge bookmarks` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use super::AppContext;

pub async fn execute(exam: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let ctx = AppContext::load(config_path.as_deref())?;
    let bookmarks = match &exam {
        Some(exam_id) => ctx.stores.bookmarks.for_exam(exam_id).await,
        None => ctx.stores.bookmarks.all().await,
    };

    if bookmarks.is_empty() {
        println!("No bookmarks.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Exam", "Question", "Title", "Note", "Added"]);
    for b in &bookmarks {
        table.add_row(vec![
            Cell::new(&b.exam_id),
            Cell::new(&b.question_id),
            Cell::new(&b.question.title),
            Cell::new(&b.note),
            Cell::new(b.created_at.format("%Y-%m-%d")),
        ]);
    }
    println!("{table}");
    Ok(())
}
