use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::Question;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Test {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub subject_id: Option<Uuid>,
    pub employee_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
    /// `None` means the attempt has no time limit.
    pub duration_seconds: Option<i32>,
    pub passing_score: Option<Decimal>,
    pub attempt_limit: i32,
    pub shuffle_questions: bool,
    pub shuffle_answers: bool,
    pub show_correct_answers: bool,
    pub allow_review: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub questions: Vec<Question>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Test {
    pub fn active_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions.iter().filter(|q| q.active)
    }

    pub fn question(&self, question_id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_mut(&mut self, question_id: Uuid) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.id == question_id)
    }

    pub fn max_score(&self) -> Decimal {
        self.active_questions().map(|q| q.points).sum()
    }

    pub fn next_position(&self) -> i32 {
        self.questions
            .iter()
            .map(|q| q.position + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn publish(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.active_questions().next().is_none() {
            return Err(Error::Validation(
                "A test needs at least one active question to be published".to_string(),
            ));
        }
        if !self.is_published {
            self.is_published = true;
            self.published_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn unpublish(&mut self, now: DateTime<Utc>) {
        self.is_published = false;
        self.published_at = None;
        self.updated_at = now;
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(Error::Validation("Test title must not be empty".to_string()));
        }
        if self.attempt_limit < 1 {
            return Err(Error::Validation(
                "Attempt limit must be a positive integer".to_string(),
            ));
        }
        if matches!(self.duration_seconds, Some(d) if d <= 0) {
            return Err(Error::Validation("Duration must be positive".to_string()));
        }
        if let Some(score) = self.passing_score {
            if score < Decimal::ZERO || score > Decimal::ONE_HUNDRED {
                return Err(Error::Validation(
                    "Passing score must be a percentage between 0 and 100".to_string(),
                ));
            }
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(Error::Validation(
                    "Start date must not be after end date".to_string(),
                ));
            }
        }
        for question in &self.questions {
            if question.test_id != self.id {
                return Err(Error::Validation(
                    "Question belongs to a different test".to_string(),
                ));
            }
            question.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::QuestionKind;
    use chrono::TimeZone;

    fn draft() -> Test {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        Test {
            id: Uuid::new_v4(),
            title: "Algebra".to_string(),
            description: None,
            subject_id: None,
            employee_id: None,
            group_id: None,
            duration_seconds: None,
            passing_score: Some(Decimal::from(60)),
            attempt_limit: 1,
            shuffle_questions: false,
            shuffle_answers: false,
            show_correct_answers: false,
            allow_review: true,
            start_date: None,
            end_date: None,
            is_published: false,
            published_at: None,
            active: true,
            questions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn essay(test_id: Uuid, points: i64, active: bool) -> Question {
        Question {
            id: Uuid::new_v4(),
            test_id,
            text: "Explain".to_string(),
            points: Decimal::from(points),
            position: 0,
            is_required: true,
            active,
            kind: QuestionKind::Essay,
        }
    }

    #[test]
    fn publish_requires_an_active_question() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut test = draft();
        assert!(test.publish(now).is_err());

        test.questions.push(essay(test.id, 3, false));
        assert!(test.publish(now).is_err());
        assert!(!test.is_published);

        test.questions.push(essay(test.id, 2, true));
        test.publish(now).unwrap();
        assert!(test.is_published);
        assert_eq!(test.published_at, Some(now));
    }

    #[test]
    fn unpublish_clears_published_at() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let mut test = draft();
        test.questions.push(essay(test.id, 2, true));
        test.publish(now).unwrap();
        test.unpublish(now);
        assert!(!test.is_published);
        assert_eq!(test.published_at, None);
    }

    #[test]
    fn max_score_sums_active_questions_only() {
        let mut test = draft();
        test.questions.push(essay(test.id, 3, true));
        test.questions.push(essay(test.id, 4, false));
        assert_eq!(test.max_score(), Decimal::from(3));
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut test = draft();
        test.start_date = Some(Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap());
        test.end_date = Some(Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap());
        assert!(matches!(test.validate(), Err(Error::Validation(_))));
    }
}
