use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub text: String,
    pub points: Decimal,
    pub position: i32,
    pub is_required: bool,
    pub active: bool,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::TrueFalse => "true_false",
            QuestionType::ShortAnswer => "short_answer",
            QuestionType::Essay => "essay",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correctness configuration, one shape per question type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        allow_multiple: bool,
        options: Vec<AnswerOption>,
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

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerOption {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: String,
    pub position: i32,
    pub is_correct: bool,
}

impl Question {
    pub fn question_type(&self) -> QuestionType {
        match self.kind {
            QuestionKind::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuestionKind::TrueFalse { .. } => QuestionType::TrueFalse,
            QuestionKind::ShortAnswer { .. } => QuestionType::ShortAnswer,
            QuestionKind::Essay => QuestionType::Essay,
        }
    }

    pub fn can_auto_grade(&self) -> bool {
        !self.requires_manual_grading()
    }

    pub fn requires_manual_grading(&self) -> bool {
        matches!(self.kind, QuestionKind::Essay)
    }

    pub fn options(&self) -> &[AnswerOption] {
        match &self.kind {
            QuestionKind::MultipleChoice { options, .. } => options,
            _ => &[],
        }
    }

    pub fn correct_option_ids(&self) -> HashSet<Uuid> {
        self.options()
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id)
            .collect()
    }

    /// Checks that points and the correctness shape are usable for grading.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::Validation("Question text must not be empty".to_string()));
        }
        if self.points < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "Question points must be non-negative, got {}",
                self.points
            )));
        }
        match &self.kind {
            QuestionKind::MultipleChoice { options, .. } => {
                if options.len() < 2 {
                    return Err(Error::Validation(
                        "Multiple choice questions need at least two options".to_string(),
                    ));
                }
                if !options.iter().any(|o| o.is_correct) {
                    return Err(Error::Validation(
                        "Multiple choice questions need at least one correct option".to_string(),
                    ));
                }
                if options.iter().any(|o| o.question_id != self.id) {
                    return Err(Error::Validation(
                        "Answer option belongs to a different question".to_string(),
                    ));
                }
            }
            QuestionKind::ShortAnswer { correct_answer, .. } => {
                if correct_answer.trim().is_empty() {
                    return Err(Error::Validation(
                        "Short answer questions need a correct answer".to_string(),
                    ));
                }
            }
            QuestionKind::TrueFalse { .. } | QuestionKind::Essay => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mcq(options: Vec<(&str, bool)>) -> Question {
        let id = Uuid::new_v4();
        Question {
            id,
            test_id: Uuid::new_v4(),
            text: "Pick one".to_string(),
            points: Decimal::ONE,
            position: 0,
            is_required: true,
            active: true,
            kind: QuestionKind::MultipleChoice {
                allow_multiple: false,
                options: options
                    .into_iter()
                    .enumerate()
                    .map(|(i, (text, is_correct))| AnswerOption {
                        id: Uuid::new_v4(),
                        question_id: id,
                        text: text.to_string(),
                        position: i as i32,
                        is_correct,
                    })
                    .collect(),
            },
        }
    }

    #[test]
    fn essay_is_the_only_manual_type() {
        let mut q = mcq(vec![("a", true), ("b", false)]);
        assert!(q.can_auto_grade());
        q.kind = QuestionKind::Essay;
        assert!(q.requires_manual_grading());
        assert!(!q.can_auto_grade());
        assert_eq!(q.question_type(), QuestionType::Essay);
    }

    #[test]
    fn multiple_choice_without_correct_option_is_rejected() {
        let q = mcq(vec![("a", false), ("b", false)]);
        assert!(matches!(q.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn negative_points_are_rejected() {
        let mut q = mcq(vec![("a", true), ("b", false)]);
        q.points = Decimal::NEGATIVE_ONE;
        assert!(matches!(q.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn kind_serializes_with_type_tag() {
        let mut q = mcq(vec![("a", true), ("b", false)]);
        q.kind = QuestionKind::ShortAnswer {
            correct_answer: "Paris".to_string(),
            case_sensitive: false,
        };
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(value["type"], "short_answer");
        assert_eq!(value["correct_answer"], "Paris");
    }
}
