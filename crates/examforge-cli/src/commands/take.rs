//! The `examforge take` command.
//!
//! Runs one exam session driven by line commands on stdin. Closing stdin or
//! typing `quit` saves the session so the next `take` offers to resume it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use examforge_core::catalog::FileCatalog;
use examforge_core::model::{
    Answer, AttemptRecord, ExamDefinition, QuestionKind, SessionStatus, SubmitReason,
};
use examforge_core::resume::{ResumeChoice, ResumeDecision};
use examforge_core::scoring;
use examforge_core::traits::ExamCatalog;
use examforge_core::{ExamSession, SessionConfig, SessionEvent, SessionServices, SubmitOutcome};
use examforge_history::Settings;

use super::{format_duration, AppContext};

const HELP: &str = "\
Commands:
  answer <question> <value>   answer a question (multi-select toggles the option)
  next | prev | goto <n>      move between questions
  show                        show the current question
  flag [question]             toggle the review flag
  bookmark [question]         toggle a bookmark
  status                      time left and progress
  pause | resume              suspend or continue the countdown
  submit                      finish and score the exam
  quit                        save and exit; resume later
  help                        this text";

enum Flow {
    Continue,
    Finished,
    Suspend,
}

pub async fn execute(
    exam_id: String,
    exam_dir: Option<PathBuf>,
    restart: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let ctx = AppContext::load(config_path.as_deref())?;
    let dir = exam_dir.unwrap_or_else(|| ctx.config.exam_dir.clone());
    let exam = FileCatalog::new(&dir).get_exam_by_id(&exam_id).await?;
    let settings = ctx.stores.settings.get().await;

    let services = SessionServices {
        persistence: Arc::clone(&ctx.persistence),
        attempts: ctx.stores.attempts.clone(),
        bookmarks: ctx.stores.bookmarks.clone(),
    };
    let config = SessionConfig {
        auto_save_interval: ctx.config.auto_save_interval(),
        ..SessionConfig::default()
    };
    let session = ExamSession::new(Arc::new(exam), services, config);
    let mut events = session.subscribe();

    match session.check_resume().await {
        ResumeDecision::Available(snapshot) if !restart => {
            session.resume(&snapshot)?;
            println!(
                "Resuming {}: {} answered, {} left.",
                session.exam().name,
                snapshot.answers.len(),
                format_duration(session.remaining_secs())
            );
        }
        ResumeDecision::Available(snapshot) => {
            session
                .apply_choice(ResumeChoice::StartNew, &snapshot)
                .await?;
            println!("Discarded the unfinished session.");
        }
        ResumeDecision::Fresh => session.start()?,
    }

    let exam = session.exam();
    println!(
        "{} ({} questions, {} points, {})",
        exam.name,
        exam.questions.len(),
        exam.max_score(),
        format_duration(exam.time_limit_secs())
    );
    println!("Type `help` for commands.\n");
    show_current(&session, &settings);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut confirm_pending = false;

    let flow = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break Flow::Suspend;
                };
                match handle_line(&session, &settings, line.trim(), &mut confirm_pending).await {
                    Ok(Flow::Continue) => {}
                    Ok(flow) => break flow,
                    Err(e) => println!("{e}"),
                }
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Submitted { attempt_id, reason: SubmitReason::TimeExpired, .. }) => {
                    println!(
                        "\nTime is up. The exam was submitted automatically. Press Enter to exit."
                    );
                    match ctx.stores.attempts.all().await.into_iter().find(|a| a.id == attempt_id) {
                        Some(record) => print_result(session.exam(), &record),
                        None => println!("The attempt could not be read back from history."),
                    }
                    break Flow::Finished;
                }
                Ok(event) => report_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "session events lagged");
                }
                Err(RecvError::Closed) => break Flow::Finished,
            }
        }
    };

    if let Flow::Suspend = flow {
        if session.flush().await {
            println!(
                "\nProgress saved. Run `examforge take --exam {}` to resume.",
                session.exam().id
            );
        } else if session.status() != SessionStatus::Completed {
            println!("\nWarning: progress could not be saved.");
        }
    }
    session.shutdown().await;
    Ok(())
}

async fn handle_line(
    session: &ExamSession,
    settings: &Settings,
    line: &str,
    confirm_pending: &mut bool,
) -> Result<Flow> {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return Ok(Flow::Continue);
    };
    let args: Vec<&str> = parts.collect();
    if command != "submit" {
        *confirm_pending = false;
    }

    match command {
        "answer" | "a" => {
            let (question_id, value) = match args.as_slice() {
                [question_id, value @ ..] if !value.is_empty() => (*question_id, value.join(" ")),
                _ => anyhow::bail!("usage: answer <question> <value>"),
            };
            if session.answer(question_id, &value)? {
                let current = session
                    .answer_for(question_id)
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "(none)".to_string());
                println!("{question_id}: {current}");
            } else {
                println!("The session is {}; answer ignored.", session.status());
            }
        }
        "next" | "n" => {
            session.next()?;
            show_current(session, settings);
        }
        "prev" | "p" => {
            session.previous()?;
            show_current(session, settings);
        }
        "goto" | "g" => {
            let n: usize = args
                .first()
                .and_then(|n| n.parse().ok())
                .filter(|n| *n >= 1)
                .context("usage: goto <question number>")?;
            session.navigate(n - 1)?;
            show_current(session, settings);
        }
        "show" => show_current(session, settings),
        "flag" | "f" => {
            let question_id = target_question(session, &args)?;
            let flagged = session.toggle_flag(&question_id)?;
            println!("{question_id}: {}", if flagged { "flagged" } else { "unflagged" });
        }
        "bookmark" | "b" => {
            let question_id = target_question(session, &args)?;
            let bookmarked = session.toggle_bookmark(&question_id)?;
            println!(
                "{question_id}: {}",
                if bookmarked { "bookmarked" } else { "bookmark removed" }
            );
        }
        "status" => print_status(session),
        "pause" => {
            session.pause()?;
            println!("Paused with {} left.", format_duration(session.remaining_secs()));
        }
        "resume" => {
            session.unpause()?;
            println!("Resumed.");
        }
        "submit" => {
            let unanswered = unanswered(session);
            if settings.confirm_before_submit && unanswered > 0 && !*confirm_pending {
                *confirm_pending = true;
                println!("{unanswered} question(s) unanswered. Type `submit` again to confirm.");
                return Ok(Flow::Continue);
            }
            *confirm_pending = false;
            match session.submit().await? {
                SubmitOutcome::Submitted(record) => print_result(session.exam(), &record),
                SubmitOutcome::AlreadyCompleted => println!("Already submitted."),
            }
            return Ok(Flow::Finished);
        }
        "quit" | "q" | "exit" => return Ok(Flow::Suspend),
        "help" | "?" => println!("{HELP}"),
        other => println!("Unknown command `{other}`. Type `help` for commands."),
    }
    Ok(Flow::Continue)
}

fn target_question(session: &ExamSession, args: &[&str]) -> Result<String> {
    match args.first() {
        Some(id) => Ok((*id).to_string()),
        None => session
            .current_question()
            .map(|q| q.id.clone())
            .context("no current question"),
    }
}

fn unanswered(session: &ExamSession) -> usize {
    session
        .exam()
        .questions
        .iter()
        .filter(|q| session.answer_for(&q.id).is_none())
        .count()
}

fn show_current(session: &ExamSession, settings: &Settings) {
    let Some(question) = session.current_question() else {
        return;
    };
    let exam = session.exam();
    let mut markers = Vec::new();
    if session.is_flagged(&question.id) {
        markers.push("flagged");
    }
    if session.is_bookmarked(&question.id) {
        markers.push("bookmarked");
    }

    println!(
        "[{}/{}] {} ({}, {} pt{}){}",
        session.current_index() + 1,
        exam.questions.len(),
        question.id,
        question.kind,
        question.points,
        if question.points == 1 { "" } else { "s" },
        if markers.is_empty() {
            String::new()
        } else {
            format!(" [{}]", markers.join(", "))
        }
    );
    println!("  {}", question.title);

    for option in &question.options {
        let selected = match session.answer_for(&question.id) {
            Some(Answer::Value(v)) => v == option.id,
            Some(Answer::Set(ids)) => ids.contains(&option.id),
            None => false,
        };
        println!(
            "  {} {}) {}",
            if selected { "*" } else { " " },
            option.id,
            option.label
        );
    }
    if question.kind == QuestionKind::Text {
        if let Some(answer) = session.answer_for(&question.id) {
            println!("  answer: {answer}");
        }
    }
    if settings.show_hints {
        if let Some(hint) = &question.hint {
            println!("  hint: {hint}");
        }
    }
    if settings.show_timer {
        println!("  time left: {}", format_duration(session.remaining_secs()));
    }
}

fn print_status(session: &ExamSession) {
    let total = session.exam().questions.len();
    println!(
        "{}: {}/{} answered, {} left{}",
        session.status(),
        total - unanswered(session),
        total,
        format_duration(session.remaining_secs()),
        match session.last_saved_at() {
            Some(at) => format!(", saved at {}", at.format("%H:%M:%S")),
            None => String::new(),
        }
    );
}

fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::TimeWarning { remaining_secs }
        | SessionEvent::FinalWarning { remaining_secs } => {
            println!("\n{} left.", format_duration(*remaining_secs));
        }
        SessionEvent::SaveFailed { reason } => {
            println!("\nWarning: {reason}. Your answers are kept in memory.");
        }
        SessionEvent::AutoSaved { at } => {
            tracing::debug!(%at, "auto-saved");
        }
        other => tracing::trace!(event = other.kind(), "ignored session event"),
    }
}

fn print_result(exam: &ExamDefinition, record: &AttemptRecord) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Answer", "Result", "Points"]);

    for (i, result) in scoring::breakdown(exam, &record.answers).iter().enumerate() {
        let answer = record
            .answers
            .get(&result.question_id)
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        let verdict = match (result.answered, result.correct) {
            (false, _) => "unanswered",
            (true, true) => "correct",
            (true, false) => "wrong",
        };
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&result.question_id),
            Cell::new(answer),
            Cell::new(verdict),
            Cell::new(format!("{}/{}", result.points_awarded, result.points_possible)),
        ]);
    }

    let totals = &record.totals;
    println!("\n{table}");
    println!(
        "Score: {}/{} ({}%), {}/{} correct, time {}",
        totals.total_score,
        totals.max_score,
        totals.percentage,
        totals.correct_count,
        totals.total_questions,
        format_duration(record.time_taken_secs)
    );
}
