use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::{Question, QuestionKind};
use crate::models::student_answer::{Response, StudentAnswer};

/// Decides whether `response` is correct for an auto-gradable question.
///
/// Essays cannot be judged by comparison and yield [`Error::NotAutoGradable`].
/// A response whose shape does not fit the question type is simply wrong.
pub fn check_answer(question: &Question, response: &Response) -> Result<bool> {
    let correct = match (&question.kind, response) {
        (QuestionKind::Essay, _) => return Err(Error::NotAutoGradable),
        (QuestionKind::MultipleChoice { allow_multiple, .. }, Response::SelectedOptions(ids)) => {
            let correct_ids = question.correct_option_ids();
            if *allow_multiple {
                let selected: HashSet<Uuid> = ids.iter().copied().collect();
                selected == correct_ids
            } else {
                matches!(ids.as_slice(), [single] if correct_ids.contains(single))
            }
        }
        (QuestionKind::TrueFalse { correct_answer }, Response::Boolean(given)) => {
            given == correct_answer
        }
        (
            QuestionKind::ShortAnswer {
                correct_answer,
                case_sensitive,
            },
            Response::Text(given),
        ) => texts_match(given, correct_answer, *case_sensitive),
        _ => false,
    };
    Ok(correct)
}

fn texts_match(given: &str, expected: &str, case_sensitive: bool) -> bool {
    let (given, expected) = (given.trim(), expected.trim());
    if case_sensitive {
        given == expected
    } else {
        given.to_lowercase() == expected.to_lowercase()
    }
}

/// Grades one answer by comparison. Leaves the answer untouched for essays.
pub fn auto_grade(
    question: &Question,
    answer: &mut StudentAnswer,
    now: DateTime<Utc>,
) -> Result<()> {
    let is_correct = match &answer.response {
        Some(response) => check_answer(question, response)?,
        None if question.can_auto_grade() => false,
        None => return Err(Error::NotAutoGradable),
    };

    answer.is_correct = Some(is_correct);
    answer.points_possible = question.points;
    answer.points_earned = if is_correct {
        question.points
    } else {
        Decimal::ZERO
    };
    answer.answered_at = answer.answered_at.or(Some(now));
    answer.manually_graded = false;
    answer.graded_by_employee_id = None;
    Ok(())
}

/// Turns a loosely-typed submitted value into a [`Response`] for `question`,
/// rejecting shapes the question type cannot accept.
///
/// Accepted forms: the tagged `{"kind": ..., "value": ...}` representation;
/// for multiple choice an option id, a list of ids or `{"selected": ...}`;
/// for true/false a boolean, `"true"`/`"false"` or `1`/`0`; for text
/// questions a string (numbers are taken verbatim).
pub fn coerce_response(question: &Question, value: &JsonValue) -> Result<Response> {
    if value.get("kind").is_some() {
        let response: Response = serde_json::from_value(value.clone())
            .map_err(|e| Error::Validation(format!("Malformed response: {}", e)))?;
        validate_response(question, &response)?;
        return Ok(response);
    }

    let response = match &question.kind {
        QuestionKind::MultipleChoice { .. } => {
            let raw = value.get("selected").unwrap_or(value);
            let ids = match raw {
                JsonValue::String(_) => vec![parse_option_id(raw)?],
                JsonValue::Array(items) => items
                    .iter()
                    .map(parse_option_id)
                    .collect::<Result<Vec<_>>>()?,
                _ => {
                    return Err(Error::Validation(
                        "Multiple choice answers must be an option id or a list of option ids"
                            .to_string(),
                    ))
                }
            };
            Response::SelectedOptions(ids)
        }
        QuestionKind::TrueFalse { .. } => Response::Boolean(coerce_bool(value)?),
        QuestionKind::ShortAnswer { .. } | QuestionKind::Essay => match value {
            JsonValue::String(s) => Response::Text(s.clone()),
            JsonValue::Number(n) => Response::Text(n.to_string()),
            _ => {
                return Err(Error::Validation(format!(
                    "A {} answer must be text",
                    question.question_type()
                )))
            }
        },
    };
    validate_response(question, &response)?;
    Ok(response)
}

/// Checks that a typed response fits the question it answers.
pub fn validate_response(question: &Question, response: &Response) -> Result<()> {
    match (&question.kind, response) {
        (
            QuestionKind::MultipleChoice {
                allow_multiple,
                options,
            },
            Response::SelectedOptions(ids),
        ) => {
            if ids.is_empty() {
                return Err(Error::Validation("No option selected".to_string()));
            }
            if !allow_multiple && ids.len() != 1 {
                return Err(Error::Validation(
                    "This question accepts exactly one option".to_string(),
                ));
            }
            let unique: HashSet<&Uuid> = ids.iter().collect();
            if unique.len() != ids.len() {
                return Err(Error::Validation("Option selected twice".to_string()));
            }
            if let Some(unknown) = ids.iter().find(|id| !options.iter().any(|o| o.id == **id)) {
                return Err(Error::Validation(format!(
                    "Option {} does not belong to this question",
                    unknown
                )));
            }
            Ok(())
        }
        (QuestionKind::TrueFalse { .. }, Response::Boolean(_)) => Ok(()),
        (QuestionKind::ShortAnswer { .. } | QuestionKind::Essay, Response::Text(_)) => Ok(()),
        (_, _) => Err(Error::Validation(format!(
            "Response does not match a {} question",
            question.question_type()
        ))),
    }
}

fn parse_option_id(value: &JsonValue) -> Result<Uuid> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .ok_or_else(|| Error::Validation(format!("Invalid option id: {}", value)))
}

fn coerce_bool(value: &JsonValue) -> Result<bool> {
    match value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(Error::Validation(format!("Not a boolean: {}", s))),
        },
        JsonValue::Number(n) => match n.as_i64() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(Error::Validation(format!("Not a boolean: {}", n))),
        },
        other => Err(Error::Validation(format!("Not a boolean: {}", other))),
    }
}
