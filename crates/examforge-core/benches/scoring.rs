use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examforge_core::model::{
    Answer, Answers, Difficulty, ExamDefinition, Question, QuestionKind, QuestionOption,
};
use examforge_core::scoring::score;
use examforge_core::statistics::history_stats;

fn make_exam(n: usize) -> ExamDefinition {
    let questions = (0..n)
        .map(|i| {
            let kind = match i % 3 {
                0 => QuestionKind::SingleSelect,
                1 => QuestionKind::MultiSelect,
                _ => QuestionKind::Text,
            };
            let options = if kind == QuestionKind::Text {
                vec![]
            } else {
                ["a", "b", "c", "d"]
                    .iter()
                    .map(|id| QuestionOption {
                        id: id.to_string(),
                        label: id.to_uppercase(),
                        is_correct: *id == "a" || (kind == QuestionKind::MultiSelect && *id == "b"),
                    })
                    .collect()
            };
            Question {
                id: format!("q{i}"),
                title: format!("Question {i}"),
                kind,
                options,
                correct_answer: (kind == QuestionKind::Text).then(|| "answer".to_string()),
                points: 1 + (i % 5) as u32,
                difficulty: Difficulty::Medium,
                tags: vec![],
                hint: None,
            }
        })
        .collect();

    ExamDefinition {
        id: "bench".into(),
        name: "Benchmark".into(),
        description: String::new(),
        time_limit_minutes: 60,
        questions,
    }
}

fn make_answers(exam: &ExamDefinition, correct: bool) -> Answers {
    exam.questions
        .iter()
        .map(|q| {
            let answer = match (q.kind, correct) {
                (QuestionKind::SingleSelect, true) => Answer::from("a"),
                (QuestionKind::MultiSelect, true) => Answer::set(["a", "b"]),
                (QuestionKind::Text, true) => Answer::from(" ANSWER "),
                (QuestionKind::MultiSelect, false) => Answer::set(["c"]),
                (_, false) => Answer::from("d"),
            };
            (q.id.clone(), answer)
        })
        .collect()
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");

    for n in [10usize, 100, 1000] {
        let exam = make_exam(n);
        let answers = make_answers(&exam, true);
        group.bench_function(format!("all_correct/{n}"), |b| {
            b.iter(|| score(black_box(&exam), black_box(&answers)))
        });
    }

    let exam = make_exam(100);
    let wrong = make_answers(&exam, false);
    group.bench_function("all_wrong/100", |b| {
        b.iter(|| score(black_box(&exam), black_box(&wrong)))
    });

    let empty = Answers::new();
    group.bench_function("unanswered/100", |b| {
        b.iter(|| score(black_box(&exam), black_box(&empty)))
    });

    group.finish();
}

fn bench_history_stats(c: &mut Criterion) {
    use examforge_core::model::{AttemptRecord, SubmitReason};

    let exam = make_exam(20);
    let answers = make_answers(&exam, true);
    let attempts: Vec<AttemptRecord> = (0..50)
        .map(|i| AttemptRecord {
            id: uuid::Uuid::nil(),
            exam_id: format!("exam-{}", i % 5),
            exam_name: "Bench".into(),
            totals: score(&exam, &answers),
            time_taken_secs: 600,
            answers: answers.clone(),
            flagged_question_ids: Default::default(),
            completed_at: chrono::Utc::now(),
            reason: SubmitReason::Manual,
        })
        .collect();

    c.bench_function("history_stats/50", |b| {
        b.iter(|| history_stats(black_box(&attempts)))
    });
}

criterion_group!(benches, bench_score, bench_history_stats);
criterion_main!(benches);
