use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use super::{AssessmentStore, AttemptStart};
use crate::error::{Error, Result};
use crate::models::attempt::{Attempt, AttemptScores, AttemptStatus};
use crate::models::question::{AnswerOption, Question, QuestionKind};
use crate::models::student_answer::{Response, StudentAnswer};
use crate::models::test::Test;

const TEST_COLUMNS: &str = "\
    id, title, description, subject_id, employee_id, group_id, duration_seconds, passing_score, \
    attempt_limit, shuffle_questions, shuffle_answers, show_correct_answers, allow_review, \
    start_date, end_date, is_published, published_at, active, created_at, updated_at";

const QUESTION_COLUMNS: &str = "\
    id, test_id, text, question_type, points, position, is_required, active, allow_multiple, \
    correct_answer_boolean, correct_answer_text, case_sensitive";

const ATTEMPT_COLUMNS: &str = "\
    id, test_id, student_id, attempt_number, status, started_at, submitted_at, graded_at, \
    duration_seconds, auto_graded_score, manual_graded_score, total_score, max_score, \
    percentage, passed, active, created_at, updated_at";

const ANSWER_COLUMNS: &str = "\
    id, attempt_id, question_id, response, points_earned, points_possible, is_correct, \
    manually_graded, graded_by_employee_id, graded_at, answered_at, feedback";

#[derive(Debug, FromRow)]
struct TestRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    subject_id: Option<Uuid>,
    employee_id: Option<Uuid>,
    group_id: Option<Uuid>,
    duration_seconds: Option<i32>,
    passing_score: Option<Decimal>,
    attempt_limit: i32,
    shuffle_questions: bool,
    shuffle_answers: bool,
    show_correct_answers: bool,
    allow_review: bool,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: Uuid,
    test_id: Uuid,
    text: String,
    question_type: String,
    points: Decimal,
    position: i32,
    is_required: bool,
    active: bool,
    allow_multiple: bool,
    correct_answer_boolean: Option<bool>,
    correct_answer_text: Option<String>,
    case_sensitive: bool,
}

#[derive(Debug, FromRow)]
struct OptionRow {
    id: Uuid,
    question_id: Uuid,
    text: String,
    position: i32,
    is_correct: bool,
}

#[derive(Debug, FromRow)]
struct AttemptRow {
    id: Uuid,
    test_id: Uuid,
    student_id: Uuid,
    attempt_number: i32,
    status: String,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    graded_at: Option<DateTime<Utc>>,
    duration_seconds: Option<i64>,
    auto_graded_score: Decimal,
    manual_graded_score: Decimal,
    total_score: Decimal,
    max_score: Decimal,
    percentage: Option<Decimal>,
    passed: Option<bool>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct AnswerRow {
    id: Uuid,
    attempt_id: Uuid,
    question_id: Uuid,
    response: Option<Json<Response>>,
    points_earned: Decimal,
    points_possible: Decimal,
    is_correct: Option<bool>,
    manually_graded: bool,
    graded_by_employee_id: Option<Uuid>,
    graded_at: Option<DateTime<Utc>>,
    answered_at: Option<DateTime<Utc>>,
    feedback: Option<String>,
}

/// Correctness columns of a question row, flattened from [`QuestionKind`].
struct KindColumns<'a> {
    question_type: &'static str,
    allow_multiple: bool,
    correct_answer_boolean: Option<bool>,
    correct_answer_text: Option<&'a str>,
    case_sensitive: bool,
}

fn kind_columns(question: &Question) -> KindColumns<'_> {
    let mut cols = KindColumns {
        question_type: question.question_type().as_str(),
        allow_multiple: false,
        correct_answer_boolean: None,
        correct_answer_text: None,
        case_sensitive: false,
    };
    match &question.kind {
        QuestionKind::MultipleChoice { allow_multiple, .. } => {
            cols.allow_multiple = *allow_multiple
        }
        QuestionKind::TrueFalse { correct_answer } => {
            cols.correct_answer_boolean = Some(*correct_answer)
        }
        QuestionKind::ShortAnswer {
            correct_answer,
            case_sensitive,
        } => {
            cols.correct_answer_text = Some(correct_answer.as_str());
            cols.case_sensitive = *case_sensitive;
        }
        QuestionKind::Essay => {}
    }
    cols
}

fn into_question(row: QuestionRow, options: Vec<AnswerOption>) -> Result<Question> {
    let missing = |what: &str| {
        Error::InconsistentState(format!("question {} has no {}", row.id, what))
    };
    let kind = match row.question_type.as_str() {
        "multiple_choice" => QuestionKind::MultipleChoice {
            allow_multiple: row.allow_multiple,
            options,
        },
        "true_false" => QuestionKind::TrueFalse {
            correct_answer: row
                .correct_answer_boolean
                .ok_or_else(|| missing("correct boolean answer"))?,
        },
        "short_answer" => QuestionKind::ShortAnswer {
            correct_answer: row
                .correct_answer_text
                .clone()
                .ok_or_else(|| missing("correct text answer"))?,
            case_sensitive: row.case_sensitive,
        },
        "essay" => QuestionKind::Essay,
        other => {
            return Err(Error::InconsistentState(format!(
                "unknown question type '{}'",
                other
            )))
        }
    };
    Ok(Question {
        id: row.id,
        test_id: row.test_id,
        text: row.text,
        points: row.points,
        position: row.position,
        is_required: row.is_required,
        active: row.active,
        kind,
    })
}

fn into_answer(row: AnswerRow) -> StudentAnswer {
    StudentAnswer {
        id: row.id,
        attempt_id: row.attempt_id,
        question_id: row.question_id,
        response: row.response.map(|Json(r)| r),
        points_earned: row.points_earned,
        points_possible: row.points_possible,
        is_correct: row.is_correct,
        manually_graded: row.manually_graded,
        graded_by_employee_id: row.graded_by_employee_id,
        graded_at: row.graded_at,
        answered_at: row.answered_at,
        feedback: row.feedback,
    }
}

fn into_attempt(row: AttemptRow, answers: Vec<StudentAnswer>) -> Result<Attempt> {
    Ok(Attempt {
        id: row.id,
        test_id: row.test_id,
        student_id: row.student_id,
        attempt_number: row.attempt_number,
        status: row.status.parse::<AttemptStatus>()?,
        started_at: row.started_at,
        submitted_at: row.submitted_at,
        graded_at: row.graded_at,
        duration_seconds: row.duration_seconds,
        scores: AttemptScores {
            auto_graded_score: row.auto_graded_score,
            manual_graded_score: row.manual_graded_score,
            total_score: row.total_score,
            max_score: row.max_score,
            percentage: row.percentage,
            passed: row.passed,
        },
        active: row.active,
        answers,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

async fn load_test(
    conn: &mut PgConnection,
    test_id: Uuid,
    for_update: bool,
) -> Result<Option<Test>> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query_as::<_, TestRow>(&format!(
        "SELECT {TEST_COLUMNS} FROM tests WHERE id = $1{lock}"
    ))
    .bind(test_id)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let question_rows = sqlx::query_as::<_, QuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM questions WHERE test_id = $1 ORDER BY position, id"
    ))
    .bind(test_id)
    .fetch_all(&mut *conn)
    .await?;

    let question_ids: Vec<Uuid> = question_rows.iter().map(|q| q.id).collect();
    let option_rows = if question_ids.is_empty() {
        Vec::new()
    } else {
        sqlx::query_as::<_, OptionRow>(
            "SELECT id, question_id, text, position, is_correct
             FROM answer_options
             WHERE question_id = ANY($1)
             ORDER BY position, id",
        )
        .bind(&question_ids)
        .fetch_all(&mut *conn)
        .await?
    };

    let mut options_by_question: HashMap<Uuid, Vec<AnswerOption>> = HashMap::new();
    for o in option_rows {
        options_by_question
            .entry(o.question_id)
            .or_default()
            .push(AnswerOption {
                id: o.id,
                question_id: o.question_id,
                text: o.text,
                position: o.position,
                is_correct: o.is_correct,
            });
    }

    let questions = question_rows
        .into_iter()
        .map(|q| {
            let options = options_by_question.remove(&q.id).unwrap_or_default();
            into_question(q, options)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(Test {
        id: row.id,
        title: row.title,
        description: row.description,
        subject_id: row.subject_id,
        employee_id: row.employee_id,
        group_id: row.group_id,
        duration_seconds: row.duration_seconds,
        passing_score: row.passing_score,
        attempt_limit: row.attempt_limit,
        shuffle_questions: row.shuffle_questions,
        shuffle_answers: row.shuffle_answers,
        show_correct_answers: row.show_correct_answers,
        allow_review: row.allow_review,
        start_date: row.start_date,
        end_date: row.end_date,
        is_published: row.is_published,
        published_at: row.published_at,
        active: row.active,
        questions,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }))
}

async fn write_questions(conn: &mut PgConnection, test: &Test) -> Result<()> {
    let question_ids: Vec<Uuid> = test.questions.iter().map(|q| q.id).collect();
    sqlx::query("DELETE FROM questions WHERE test_id = $1 AND NOT (id = ANY($2))")
        .bind(test.id)
        .bind(&question_ids)
        .execute(&mut *conn)
        .await?;

    for question in &test.questions {
        let cols = kind_columns(question);
        sqlx::query(
            r#"
            INSERT INTO questions (
                id, test_id, text, question_type, points, position, is_required, active,
                allow_multiple, correct_answer_boolean, correct_answer_text, case_sensitive
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                text = EXCLUDED.text,
                question_type = EXCLUDED.question_type,
                points = EXCLUDED.points,
                position = EXCLUDED.position,
                is_required = EXCLUDED.is_required,
                active = EXCLUDED.active,
                allow_multiple = EXCLUDED.allow_multiple,
                correct_answer_boolean = EXCLUDED.correct_answer_boolean,
                correct_answer_text = EXCLUDED.correct_answer_text,
                case_sensitive = EXCLUDED.case_sensitive
            "#,
        )
        .bind(question.id)
        .bind(test.id)
        .bind(&question.text)
        .bind(cols.question_type)
        .bind(question.points)
        .bind(question.position)
        .bind(question.is_required)
        .bind(question.active)
        .bind(cols.allow_multiple)
        .bind(cols.correct_answer_boolean)
        .bind(cols.correct_answer_text)
        .bind(cols.case_sensitive)
        .execute(&mut *conn)
        .await?;

        let option_ids: Vec<Uuid> = question.options().iter().map(|o| o.id).collect();
        sqlx::query("DELETE FROM answer_options WHERE question_id = $1 AND NOT (id = ANY($2))")
            .bind(question.id)
            .bind(&option_ids)
            .execute(&mut *conn)
            .await?;

        for option in question.options() {
            sqlx::query(
                r#"
                INSERT INTO answer_options (id, question_id, text, position, is_correct)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    text = EXCLUDED.text,
                    position = EXCLUDED.position,
                    is_correct = EXCLUDED.is_correct
                "#,
            )
            .bind(option.id)
            .bind(question.id)
            .bind(&option.text)
            .bind(option.position)
            .bind(option.is_correct)
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn load_answers(
    conn: &mut PgConnection,
    attempt_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<StudentAnswer>>> {
    let mut by_attempt: HashMap<Uuid, Vec<StudentAnswer>> = HashMap::new();
    if attempt_ids.is_empty() {
        return Ok(by_attempt);
    }
    let rows = sqlx::query_as::<_, AnswerRow>(&format!(
        "SELECT {ANSWER_COLUMNS} FROM student_answers WHERE attempt_id = ANY($1)"
    ))
    .bind(attempt_ids)
    .fetch_all(&mut *conn)
    .await?;
    for row in rows {
        by_attempt.entry(row.attempt_id).or_default().push(into_answer(row));
    }
    Ok(by_attempt)
}

async fn attach_answers(conn: &mut PgConnection, rows: Vec<AttemptRow>) -> Result<Vec<Attempt>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let mut answers = load_answers(conn, &ids).await?;
    rows.into_iter()
        .map(|row| {
            let own = answers.remove(&row.id).unwrap_or_default();
            into_attempt(row, own)
        })
        .collect()
}

async fn write_attempt(conn: &mut PgConnection, attempt: &Attempt) -> Result<()> {
    let scores = attempt.scores();
    sqlx::query(
        r#"
        INSERT INTO attempts (
            id, test_id, student_id, attempt_number, status, started_at, submitted_at, graded_at,
            duration_seconds, auto_graded_score, manual_graded_score, total_score, max_score,
            percentage, passed, active, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            submitted_at = COALESCE(attempts.submitted_at, EXCLUDED.submitted_at),
            graded_at = EXCLUDED.graded_at,
            duration_seconds = EXCLUDED.duration_seconds,
            auto_graded_score = EXCLUDED.auto_graded_score,
            manual_graded_score = EXCLUDED.manual_graded_score,
            total_score = EXCLUDED.total_score,
            max_score = EXCLUDED.max_score,
            percentage = EXCLUDED.percentage,
            passed = EXCLUDED.passed,
            active = EXCLUDED.active,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(attempt.id)
    .bind(attempt.test_id)
    .bind(attempt.student_id)
    .bind(attempt.attempt_number)
    .bind(attempt.status().as_str())
    .bind(attempt.started_at)
    .bind(attempt.submitted_at())
    .bind(attempt.graded_at())
    .bind(attempt.duration_seconds())
    .bind(scores.auto_graded_score())
    .bind(scores.manual_graded_score())
    .bind(scores.total_score())
    .bind(scores.max_score())
    .bind(scores.percentage())
    .bind(scores.passed())
    .bind(attempt.active)
    .bind(attempt.created_at)
    .bind(attempt.updated_at)
    .execute(&mut *conn)
    .await?;

    for answer in attempt.answers() {
        sqlx::query(
            r#"
            INSERT INTO student_answers (
                id, attempt_id, question_id, response, points_earned, points_possible, is_correct,
                manually_graded, graded_by_employee_id, graded_at, answered_at, feedback
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (attempt_id, question_id) DO UPDATE SET
                response = EXCLUDED.response,
                points_earned = EXCLUDED.points_earned,
                points_possible = EXCLUDED.points_possible,
                is_correct = EXCLUDED.is_correct,
                manually_graded = EXCLUDED.manually_graded,
                graded_by_employee_id = EXCLUDED.graded_by_employee_id,
                graded_at = EXCLUDED.graded_at,
                answered_at = EXCLUDED.answered_at,
                feedback = EXCLUDED.feedback
            "#,
        )
        .bind(answer.id)
        .bind(attempt.id)
        .bind(answer.question_id)
        .bind(answer.response.as_ref().map(Json))
        .bind(answer.points_earned)
        .bind(answer.points_possible)
        .bind(answer.is_correct)
        .bind(answer.manually_graded)
        .bind(answer.graded_by_employee_id)
        .bind(answer.graded_at)
        .bind(answer.answered_at)
        .bind(&answer.feedback)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgAssessmentStore {
    pool: PgPool,
}

impl PgAssessmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl AssessmentStore for PgAssessmentStore {
    async fn insert_test(&self, test: &Test) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO tests (
                id, title, description, subject_id, employee_id, group_id, duration_seconds,
                passing_score, attempt_limit, shuffle_questions, shuffle_answers,
                show_correct_answers, allow_review, start_date, end_date, is_published,
                published_at, active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(test.id)
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.subject_id)
        .bind(test.employee_id)
        .bind(test.group_id)
        .bind(test.duration_seconds)
        .bind(test.passing_score)
        .bind(test.attempt_limit)
        .bind(test.shuffle_questions)
        .bind(test.shuffle_answers)
        .bind(test.show_correct_answers)
        .bind(test.allow_review)
        .bind(test.start_date)
        .bind(test.end_date)
        .bind(test.is_published)
        .bind(test.published_at)
        .bind(test.active)
        .bind(test.created_at)
        .bind(test.updated_at)
        .execute(&mut *tx)
        .await?;
        write_questions(&mut tx, test).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        let mut conn = self.pool.acquire().await?;
        load_test(&mut conn, test_id, false).await
    }

    async fn save_test(&self, test: &Test) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE tests SET
                title = $2, description = $3, subject_id = $4, employee_id = $5, group_id = $6,
                duration_seconds = $7, passing_score = $8, attempt_limit = $9,
                shuffle_questions = $10, shuffle_answers = $11, show_correct_answers = $12,
                allow_review = $13, start_date = $14, end_date = $15, is_published = $16,
                published_at = $17, active = $18, updated_at = $19
            WHERE id = $1
            "#,
        )
        .bind(test.id)
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.subject_id)
        .bind(test.employee_id)
        .bind(test.group_id)
        .bind(test.duration_seconds)
        .bind(test.passing_score)
        .bind(test.attempt_limit)
        .bind(test.shuffle_questions)
        .bind(test.shuffle_answers)
        .bind(test.show_correct_answers)
        .bind(test.allow_review)
        .bind(test.start_date)
        .bind(test.end_date)
        .bind(test.is_published)
        .bind(test.published_at)
        .bind(test.active)
        .bind(test.updated_at)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Test {} not found", test.id)));
        }
        write_questions(&mut tx, test).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn start_attempt<F>(
        &self,
        test_id: Uuid,
        student_id: Uuid,
        decide: F,
    ) -> Result<AttemptStart>
    where
        F: FnOnce(&Test, &[Attempt]) -> Result<AttemptStart> + Send,
    {
        let mut tx = self.pool.begin().await?;
        let test = load_test(&mut tx, test_id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;

        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE test_id = $1 AND student_id = $2
             ORDER BY created_at, attempt_number"
        ))
        .bind(test_id)
        .bind(student_id)
        .fetch_all(&mut *tx)
        .await?;
        let existing = attach_answers(&mut tx, rows).await?;

        let outcome = decide(&test, &existing)?;
        if let AttemptStart::Created(attempt) = &outcome {
            write_attempt(&mut tx, attempt).await?;
        }
        tx.commit().await?;
        Ok(outcome)
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1"
        ))
        .bind(attempt_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(attach_answers(&mut conn, rows).await?.into_iter().next())
    }

    async fn update_attempt<F, R>(&self, attempt_id: Uuid, apply: F) -> Result<R>
    where
        F: FnOnce(&Test, &mut Attempt) -> Result<R> + Send,
        R: Send,
    {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = $1 FOR UPDATE"
        ))
        .bind(attempt_id)
        .fetch_all(&mut *tx)
        .await?;
        let mut attempt = attach_answers(&mut tx, rows)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))?;

        let test = load_test(&mut tx, attempt.test_id, false)
            .await?
            .ok_or_else(|| {
                Error::InconsistentState(format!(
                    "attempt {} references missing test {}",
                    attempt_id, attempt.test_id
                ))
            })?;

        let result = apply(&test, &mut attempt)?;
        write_attempt(&mut tx, &attempt).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn list_student_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE test_id = $1 AND student_id = $2
             ORDER BY created_at, attempt_number"
        ))
        .bind(test_id)
        .bind(student_id)
        .fetch_all(&mut *conn)
        .await?;
        attach_answers(&mut conn, rows).await
    }

    async fn list_test_attempts(&self, test_id: Uuid) -> Result<Vec<Attempt>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE test_id = $1 \
             ORDER BY created_at, attempt_number"
        ))
        .bind(test_id)
        .fetch_all(&mut *conn)
        .await?;
        attach_answers(&mut conn, rows).await
    }

    async fn list_open_attempts(&self) -> Result<Vec<Attempt>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, AttemptRow>(&format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE status IN ('started', 'in_progress')
             ORDER BY started_at"
        ))
        .fetch_all(&mut *conn)
        .await?;
        attach_answers(&mut conn, rows).await
    }
}
