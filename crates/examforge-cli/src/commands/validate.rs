//! The `examforge validate` command.

use std::path::PathBuf;

use anyhow::Result;

use examforge_core::catalog;

pub fn execute(exam_path: PathBuf) -> Result<()> {
    let exams = if exam_path.is_dir() {
        catalog::load_exam_directory(&exam_path)?
    } else {
        vec![catalog::parse_exam_file(&exam_path)?]
    };

    if exams.is_empty() {
        anyhow::bail!("no valid exam files found in {}", exam_path.display());
    }

    let mut total_warnings = 0;

    for exam in &exams {
        println!(
            "Exam: {} [{}] ({} questions, {} points, {} min)",
            exam.name,
            exam.id,
            exam.questions.len(),
            exam.max_score(),
            exam.time_limit_minutes
        );

        let warnings = catalog::validate_exam(exam);
        for w in &warnings {
            let prefix = w
                .question_id
                .as_ref()
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All exams valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
