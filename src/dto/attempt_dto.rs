use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::models::attempt::{Attempt, AttemptScores, AttemptStatus};
use crate::models::question::QuestionType;
use crate::models::student_answer::Response;
use crate::models::grade::LetterGrade;

#[derive(Debug, Clone, Deserialize)]
pub struct RecordAnswerPayload {
    pub question_id: Uuid,
    /// Raw answer value, coerced against the question type.
    pub response: JsonValue,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ManualGradePayload {
    #[validate(range(min = 0.0, message = "Points must be non-negative"))]
    pub points_earned: f64,
    #[validate(length(max = 5000))]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PartialCreditPayload {
    #[validate(range(min = 0.0, max = 100.0))]
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub graded_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    #[serde(flatten)]
    pub scores: AttemptScores,
    pub letter_grade: Option<LetterGrade>,
    pub numeric_grade: Option<u8>,
    pub answered_count: usize,
    pub active: bool,
}

impl From<&Attempt> for AttemptSummary {
    fn from(attempt: &Attempt) -> Self {
        Self {
            id: attempt.id,
            test_id: attempt.test_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            status: attempt.status(),
            started_at: attempt.started_at,
            submitted_at: attempt.submitted_at(),
            graded_at: attempt.graded_at(),
            duration_seconds: attempt.duration_seconds(),
            scores: attempt.scores().clone(),
            letter_grade: attempt.letter_grade(),
            numeric_grade: attempt.numeric_grade(),
            answered_count: attempt
                .answers()
                .iter()
                .filter(|a| a.response.is_some())
                .count(),
            active: attempt.active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StartAttemptResponse {
    pub resumed: bool,
    pub attempt: AttemptSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionView {
    pub id: Uuid,
    pub text: String,
}

/// A question as shown to the student taking the attempt. Carries no
/// correctness data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptQuestion {
    pub id: Uuid,
    pub text: String,
    pub question_type: QuestionType,
    pub points: Decimal,
    pub is_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionView>,
    /// The student's current response, if any.
    pub response: Option<Response>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewItem {
    pub question_id: Uuid,
    pub text: String,
    pub question_type: QuestionType,
    pub response: Option<Response>,
    pub points_earned: Decimal,
    pub points_possible: Decimal,
    pub is_correct: Option<bool>,
    pub feedback: Option<String>,
    /// Present only when the test reveals correct answers. Always absent for essays.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<Response>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptReview {
    pub attempt: AttemptSummary,
    pub items: Vec<ReviewItem>,
}
