use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::dto::test_dto::{
    CreateQuestionPayload, CreateTestPayload, QuestionKindPayload, UpdateQuestionPayload,
};
use crate::error::{Error, Result};
use crate::models::question::{AnswerOption, Question, QuestionKind};
use crate::models::test::Test;
use crate::repositories::AssessmentStore;
use crate::services::cloner;
use crate::services::score_aggregator::round_score;
use crate::utils::time::Clock;

fn to_decimal(value: f64, field: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(round_score)
        .ok_or_else(|| Error::Validation(format!("Invalid {}: {}", field, value)))
}

fn build_question(
    test_id: Uuid,
    position: i32,
    payload: CreateQuestionPayload,
) -> Result<Question> {
    let id = Uuid::new_v4();
    let kind = match payload.kind {
        QuestionKindPayload::MultipleChoice {
            allow_multiple,
            options,
        } => QuestionKind::MultipleChoice {
            allow_multiple,
            options: options
                .into_iter()
                .enumerate()
                .map(|(i, o)| AnswerOption {
                    id: Uuid::new_v4(),
                    question_id: id,
                    text: o.text,
                    position: i as i32,
                    is_correct: o.is_correct,
                })
                .collect(),
        },
        QuestionKindPayload::TrueFalse { correct_answer } => {
            QuestionKind::TrueFalse { correct_answer }
        }
        QuestionKindPayload::ShortAnswer {
            correct_answer,
            case_sensitive,
        } => QuestionKind::ShortAnswer {
            correct_answer,
            case_sensitive,
        },
        QuestionKindPayload::Essay => QuestionKind::Essay,
    };

    let question = Question {
        id,
        test_id,
        text: payload.text,
        points: to_decimal(payload.points, "points")?,
        position,
        is_required: payload.is_required,
        active: true,
        kind,
    };
    question.validate()?;
    Ok(question)
}

/// Authoring and publication of tests.
pub struct TestService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for TestService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: AssessmentStore> TestService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn create_test(
        &self,
        payload: CreateTestPayload,
        employee_id: Option<Uuid>,
    ) -> Result<Test> {
        let now = self.clock.now();
        let id = Uuid::new_v4();
        let passing_score = payload
            .passing_score
            .map(|p| to_decimal(p, "passing score"))
            .transpose()?;

        let questions = payload
            .questions
            .into_iter()
            .enumerate()
            .map(|(i, q)| build_question(id, i as i32, q))
            .collect::<Result<Vec<_>>>()?;

        let test = Test {
            id,
            title: payload.title.trim().to_string(),
            description: payload.description,
            subject_id: payload.subject_id,
            employee_id,
            group_id: payload.group_id,
            duration_seconds: payload.duration_seconds,
            passing_score,
            attempt_limit: payload.attempt_limit,
            shuffle_questions: payload.shuffle_questions,
            shuffle_answers: payload.shuffle_answers,
            show_correct_answers: payload.show_correct_answers,
            allow_review: payload.allow_review,
            start_date: payload.start_date,
            end_date: payload.end_date,
            is_published: false,
            published_at: None,
            active: true,
            questions,
            created_at: now,
            updated_at: now,
        };
        test.validate()?;
        self.store.insert_test(&test).await?;

        tracing::info!(test_id = %test.id, questions = test.questions.len(), "test created");
        Ok(test)
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    pub async fn add_question(
        &self,
        test_id: Uuid,
        payload: CreateQuestionPayload,
    ) -> Result<Question> {
        let mut test = self.get_test(test_id).await?;
        let question = build_question(test.id, test.next_position(), payload)?;
        test.questions.push(question.clone());
        test.updated_at = self.clock.now();
        self.store.save_test(&test).await?;
        Ok(question)
    }

    pub async fn update_question(
        &self,
        test_id: Uuid,
        question_id: Uuid,
        payload: UpdateQuestionPayload,
    ) -> Result<Question> {
        let mut test = self.get_test(test_id).await?;
        let question = test
            .question_mut(question_id)
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))?;

        if let Some(text) = payload.text {
            question.text = text;
        }
        if let Some(points) = payload.points {
            question.points = to_decimal(points, "points")?;
        }
        if let Some(is_required) = payload.is_required {
            question.is_required = is_required;
        }
        question.validate()?;
        let updated = question.clone();

        test.updated_at = self.clock.now();
        self.store.save_test(&test).await?;
        Ok(updated)
    }

    /// Soft-deletes a question. Answers already given to it are kept.
    pub async fn deactivate_question(&self, test_id: Uuid, question_id: Uuid) -> Result<()> {
        let mut test = self.get_test(test_id).await?;
        let question = test
            .question_mut(question_id)
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))?;
        question.active = false;

        if test.is_published && test.active_questions().next().is_none() {
            return Err(Error::Validation(
                "A published test must keep at least one active question".to_string(),
            ));
        }
        test.updated_at = self.clock.now();
        self.store.save_test(&test).await
    }

    pub async fn publish_test(&self, test_id: Uuid) -> Result<Test> {
        let mut test = self.get_test(test_id).await?;
        test.validate()?;
        test.publish(self.clock.now())?;
        self.store.save_test(&test).await?;
        tracing::info!(test_id = %test.id, "test published");
        Ok(test)
    }

    pub async fn unpublish_test(&self, test_id: Uuid) -> Result<Test> {
        let mut test = self.get_test(test_id).await?;
        test.unpublish(self.clock.now());
        self.store.save_test(&test).await?;
        tracing::info!(test_id = %test.id, "test unpublished");
        Ok(test)
    }

    pub async fn duplicate_test(&self, test_id: Uuid) -> Result<Test> {
        let source = self.get_test(test_id).await?;
        let copy = cloner::duplicate_test(&source, self.clock.now());
        self.store.insert_test(&copy).await?;
        tracing::info!(source_test_id = %source.id, test_id = %copy.id, "test duplicated");
        Ok(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::test_dto::OptionPayload;
    use crate::repositories::InMemoryAssessmentStore;
    use crate::utils::time::ManualClock;
    use chrono::{TimeZone, Utc};

    fn service() -> TestService<InMemoryAssessmentStore> {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap());
        TestService::new(Arc::new(InMemoryAssessmentStore::new()), Arc::new(clock))
    }

    fn payload() -> CreateTestPayload {
        serde_json::from_value(serde_json::json!({
            "title": "  Geography  ",
            "passing_score": 60.0,
            "questions": [
                {
                    "type": "multiple_choice",
                    "text": "Capital of France?",
                    "points": 2.0,
                    "options": [
                        { "text": "Paris", "is_correct": true },
                        { "text": "Lyon" }
                    ]
                },
                { "type": "essay", "text": "Describe the Alps", "points": 3.0 }
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn created_test_is_a_validated_draft() {
        let service = service();
        let test = service.create_test(payload(), None).await.unwrap();

        assert_eq!(test.title, "Geography");
        assert!(!test.is_published);
        assert_eq!(test.attempt_limit, 1);
        assert_eq!(test.max_score(), Decimal::from(5));
        assert_eq!(test.questions[0].options()[0].question_id, test.questions[0].id);
        assert_eq!(test.questions[1].position, 1);
        assert_eq!(service.get_test(test.id).await.unwrap(), test);
    }

    #[tokio::test]
    async fn multiple_choice_without_a_correct_option_is_rejected() {
        let service = service();
        let mut bad = payload();
        bad.questions[0].kind = QuestionKindPayload::MultipleChoice {
            allow_multiple: false,
            options: vec![
                OptionPayload { text: "a".into(), is_correct: false },
                OptionPayload { text: "b".into(), is_correct: false },
            ],
        };
        let err = service.create_test(bad, None).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn deactivated_questions_stop_counting() {
        let service = service();
        let test = service.create_test(payload(), None).await.unwrap();
        let essay_id = test.questions[1].id;

        service.deactivate_question(test.id, essay_id).await.unwrap();
        let stored = service.get_test(test.id).await.unwrap();
        assert_eq!(stored.max_score(), Decimal::from(2));
        assert_eq!(stored.questions.len(), 2);
    }

    #[tokio::test]
    async fn publish_unpublish_and_update() {
        let service = service();
        let test = service.create_test(payload(), None).await.unwrap();

        let published = service.publish_test(test.id).await.unwrap();
        assert!(published.is_published);
        assert!(published.published_at.is_some());

        let edited = service
            .update_question(
                test.id,
                test.questions[0].id,
                UpdateQuestionPayload {
                    points: Some(4.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.points, Decimal::from(4));

        let unpublished = service.unpublish_test(test.id).await.unwrap();
        assert!(!unpublished.is_published);
        assert_eq!(unpublished.published_at, None);
    }

    #[tokio::test]
    async fn empty_draft_cannot_be_published() {
        let service = service();
        let mut empty = payload();
        empty.questions.clear();
        let test = service.create_test(empty, None).await.unwrap();
        assert!(matches!(
            service.publish_test(test.id).await,
            Err(Error::Validation(_))
        ));
    }
}
