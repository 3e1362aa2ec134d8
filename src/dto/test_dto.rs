use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn default_attempt_limit() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionPayload {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Correctness configuration as submitted by an author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKindPayload {
    MultipleChoice {
        #[serde(default)]
        allow_multiple: bool,
        options: Vec<OptionPayload>,
    },
    TrueFalse {
        correct_answer: bool,
    },
    ShortAnswer {
        correct_answer: String,
        #[serde(default)]
        case_sensitive: bool,
    },
    Essay,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    #[validate(range(min = 0.0, message = "Points must be non-negative"))]
    pub points: f64,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(flatten)]
    pub kind: QuestionKindPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Duration must be at least one second"))]
    pub duration_seconds: Option<i32>,
    #[validate(range(min = 0.0, max = 100.0))]
    pub passing_score: Option<f64>,
    #[serde(default = "default_attempt_limit")]
    #[validate(range(min = 1))]
    pub attempt_limit: i32,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub shuffle_answers: bool,
    #[serde(default)]
    pub show_correct_answers: bool,
    #[serde(default = "default_true")]
    pub allow_review: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<CreateQuestionPayload>,
}

/// Partial edit of a question. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateQuestionPayload {
    #[validate(length(min = 1, max = 5000))]
    pub text: Option<String>,
    #[validate(range(min = 0.0))]
    pub points: Option<f64>,
    pub is_required: Option<bool>,
}
