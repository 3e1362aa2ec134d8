use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::attempt::Attempt;
use crate::models::test::Test;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IneligibleReason {
    NotPublished,
    OutOfWindow,
    AttemptLimitReached,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            IneligibleReason::NotPublished => "NOT_PUBLISHED",
            IneligibleReason::OutOfWindow => "OUT_OF_WINDOW",
            IneligibleReason::AttemptLimitReached => "ATTEMPT_LIMIT_REACHED",
        };
        f.write_str(code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eligibility {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<IneligibleReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_attempts: Option<i32>,
}

impl Eligibility {
    fn denied(reason: IneligibleReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            remaining_attempts: None,
        }
    }
}

/// Attempts that count against the limit: submitted and not soft-deleted.
pub fn submitted_count(attempts: &[Attempt], test_id: Uuid, student_id: Uuid) -> i32 {
    attempts
        .iter()
        .filter(|a| a.test_id == test_id && a.student_id == student_id)
        .filter(|a| a.active && a.is_submitted())
        .count() as i32
}

/// Decides whether `student_id` may start a new attempt. Rules are checked in
/// order and the first failure wins. `attempts` may contain attempts of other
/// students or tests; only the matching ones are counted.
pub fn can_start_attempt(
    test: &Test,
    student_id: Uuid,
    attempts: &[Attempt],
    now: DateTime<Utc>,
) -> Eligibility {
    if !test.active || !test.is_published {
        return Eligibility::denied(IneligibleReason::NotPublished);
    }

    let opened = test.start_date.map_or(true, |start| now >= start);
    let not_closed = test.end_date.map_or(true, |end| now <= end);
    if !(opened && not_closed) {
        return Eligibility::denied(IneligibleReason::OutOfWindow);
    }

    let used = submitted_count(attempts, test.id, student_id);
    if used >= test.attempt_limit {
        return Eligibility::denied(IneligibleReason::AttemptLimitReached);
    }

    Eligibility {
        allowed: true,
        reason: None,
        remaining_attempts: Some(test.attempt_limit - used),
    }
}

pub fn can_retake(test: &Test, student_id: Uuid, attempts: &[Attempt]) -> bool {
    submitted_count(attempts, test.id, student_id) < test.attempt_limit
}

/// True while an essay answer of the attempt still waits for a human grade.
pub fn requires_manual_grading(test: &Test, attempt: &Attempt) -> bool {
    attempt.answers().iter().any(|answer| {
        !answer.manually_graded
            && test
                .question(answer.question_id)
                .map_or(false, |q| q.requires_manual_grading())
    })
}

/// Number the next attempt of this student on this test would get.
pub fn next_attempt_number(attempts: &[Attempt], test_id: Uuid, student_id: Uuid) -> i32 {
    attempts
        .iter()
        .filter(|a| a.test_id == test_id && a.student_id == student_id)
        .map(|a| a.attempt_number)
        .max()
        .unwrap_or(0)
        + 1
}
