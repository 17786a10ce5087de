//! The `examforge init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("examforge.toml").exists() {
        println!("examforge.toml already exists, skipping.");
    } else {
        std::fs::write("examforge.toml", SAMPLE_CONFIG)?;
        println!("Created examforge.toml");
    }

    std::fs::create_dir_all("exams")?;
    let sample_path = Path::new("exams/sample.toml");
    if sample_path.exists() {
        println!("exams/sample.toml already exists, skipping.");
    } else {
        std::fs::write(sample_path, SAMPLE_EXAM)?;
        println!("Created exams/sample.toml");
    }

    println!("\nNext steps:");
    println!("  1. Run: examforge validate --exam-dir exams");
    println!("  2. Run: examforge take --exam sample");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# examforge configuration

exam_dir = "exams"
auto_save_interval_secs = 30

[storage]
# "local", "remote" or "mock"
mode = "local"
fallback_enabled = true

[storage.local]
dir = ".examforge"

# [storage.remote]
# base_url = "https://exams.example.com"
# api_token = "${EXAMFORGE_REMOTE_TOKEN}"
# timeout_secs = 10
"#;

const SAMPLE_EXAM: &str = r#"[exam]
id = "sample"
name = "Sample Exam"
description = "A short exam to try examforge"
time_limit_minutes = 10

[[questions]]
id = "q1"
title = "Which keyword declares a variable binding in Rust?"
type = "single_select"
points = 2
difficulty = "easy"
hint = "Three letters."

[[questions.options]]
id = "a"
label = "let"
is_correct = true

[[questions.options]]
id = "b"
label = "var"

[[questions.options]]
id = "c"
label = "def"

[[questions]]
id = "q2"
title = "Which of these types implement Copy?"
type = "multi_select"
points = 3
difficulty = "medium"
hint = "Types that own heap memory cannot be Copy."

[[questions.options]]
id = "a"
label = "u32"
is_correct = true

[[questions.options]]
id = "b"
label = "String"

[[questions.options]]
id = "c"
label = "bool"
is_correct = true

[[questions]]
id = "q3"
title = "What is the name of the rule set that governs how Rust manages memory?"
type = "text"
correct_answer = "ownership"
points = 1
difficulty = "easy"
hint = "Every value has exactly one of these."
"#;
