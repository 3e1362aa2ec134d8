use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A student's response, shaped by the question type it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Response {
    SelectedOptions(Vec<Uuid>),
    Boolean(bool),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentAnswer {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    /// `None` when the question was left unanswered.
    pub response: Option<Response>,
    pub points_earned: Decimal,
    pub points_possible: Decimal,
    /// `None` means not graded yet.
    pub is_correct: Option<bool>,
    pub manually_graded: bool,
    pub graded_by_employee_id: Option<Uuid>,
    pub graded_at: Option<DateTime<Utc>>,
    pub answered_at: Option<DateTime<Utc>>,
    pub feedback: Option<String>,
}

impl StudentAnswer {
    pub fn new(attempt_id: Uuid, question_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt_id,
            question_id,
            response: None,
            points_earned: Decimal::ZERO,
            points_possible: Decimal::ZERO,
            is_correct: None,
            manually_graded: false,
            graded_by_employee_id: None,
            graded_at: None,
            answered_at: None,
            feedback: None,
        }
    }

    pub fn is_graded(&self) -> bool {
        self.is_correct.is_some()
    }

    /// Replaces the response and drops any grade derived from the previous one.
    pub fn set_response(&mut self, response: Response, now: DateTime<Utc>) {
        self.response = Some(response);
        self.answered_at = Some(now);
        self.points_earned = Decimal::ZERO;
        self.is_correct = None;
        self.manually_graded = false;
        self.graded_by_employee_id = None;
        self.graded_at = None;
        self.feedback = None;
    }
}
