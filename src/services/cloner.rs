use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::question::{Question, QuestionKind};
use crate::models::test::Test;

const COPY_SUFFIX: &str = " (copy)";

/// Deep copy of a test as a new unpublished draft. Questions and options get
/// fresh ids and point at their new parents; order and correctness are kept.
pub fn duplicate_test(test: &Test, now: DateTime<Utc>) -> Test {
    let new_id = Uuid::new_v4();
    let mut questions: Vec<Question> = test
        .questions
        .iter()
        .map(|q| duplicate_question(q, new_id))
        .collect();
    questions.sort_by_key(|q| q.position);

    Test {
        id: new_id,
        title: format!("{}{}", test.title, COPY_SUFFIX),
        is_published: false,
        published_at: None,
        questions,
        created_at: now,
        updated_at: now,
        ..test.clone()
    }
}

fn duplicate_question(question: &Question, test_id: Uuid) -> Question {
    let id = Uuid::new_v4();
    let kind = match &question.kind {
        QuestionKind::MultipleChoice {
            allow_multiple,
            options,
        } => {
            let mut options: Vec<_> = options
                .iter()
                .map(|o| crate::models::question::AnswerOption {
                    id: Uuid::new_v4(),
                    question_id: id,
                    ..o.clone()
                })
                .collect();
            options.sort_by_key(|o| o.position);
            QuestionKind::MultipleChoice {
                allow_multiple: *allow_multiple,
                options,
            }
        }
        other => other.clone(),
    };

    Question {
        id,
        test_id,
        kind,
        ..question.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::AnswerOption;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn source() -> Test {
        let created = Utc.with_ymd_and_hms(2026, 1, 10, 10, 0, 0).unwrap();
        let test_id = Uuid::new_v4();
        let mcq_id = Uuid::new_v4();
        let options = (0..4)
            .map(|i| AnswerOption {
                id: Uuid::new_v4(),
                question_id: mcq_id,
                text: format!("{}", i + 1),
                position: i,
                is_correct: i == 3,
            })
            .collect();
        let mk = |id: Uuid, position: i32, points: i64, kind: QuestionKind| Question {
            id,
            test_id,
            text: format!("Question {}", position),
            points: Decimal::from(points),
            position,
            is_required: true,
            active: true,
            kind,
        };
        Test {
            id: test_id,
            title: "Arithmetic".to_string(),
            description: Some("Warm-up".to_string()),
            subject_id: Some(Uuid::new_v4()),
            employee_id: Some(Uuid::new_v4()),
            group_id: None,
            duration_seconds: Some(600),
            passing_score: Some(Decimal::from(70)),
            attempt_limit: 3,
            shuffle_questions: true,
            shuffle_answers: false,
            show_correct_answers: true,
            allow_review: true,
            start_date: None,
            end_date: None,
            is_published: true,
            published_at: Some(created),
            active: true,
            questions: vec![
                mk(
                    mcq_id,
                    0,
                    2,
                    QuestionKind::MultipleChoice {
                        allow_multiple: false,
                        options,
                    },
                ),
                mk(Uuid::new_v4(), 1, 1, QuestionKind::TrueFalse { correct_answer: true }),
                mk(Uuid::new_v4(), 2, 3, QuestionKind::Essay),
            ],
            created_at: created,
            updated_at: created,
        }
    }

    #[test]
    fn duplicate_is_an_unpublished_copy_with_new_ids() {
        let original = source();
        let now = Utc.with_ymd_and_hms(2026, 1, 20, 10, 0, 0).unwrap();
        let copy = duplicate_test(&original, now);

        assert_ne!(copy.id, original.id);
        assert!(!copy.is_published);
        assert_eq!(copy.published_at, None);
        assert_eq!(copy.title, "Arithmetic (copy)");
        assert_eq!(copy.attempt_limit, 3);
        assert_eq!(copy.questions.len(), 3);

        for (new, old) in copy.questions.iter().zip(&original.questions) {
            assert_ne!(new.id, old.id);
            assert_eq!(new.test_id, copy.id);
            assert_eq!(new.text, old.text);
            assert_eq!(new.points, old.points);
            assert_eq!(new.question_type(), old.question_type());
        }
        copy.validate().unwrap();
    }

    #[test]
    fn options_are_rewired_to_the_new_question() {
        let original = source();
        let copy = duplicate_test(&original, original.created_at);
        let new_mcq = &copy.questions[0];
        let old_mcq = &original.questions[0];

        assert_eq!(new_mcq.options().len(), 4);
        for (new, old) in new_mcq.options().iter().zip(old_mcq.options()) {
            assert_ne!(new.id, old.id);
            assert_eq!(new.question_id, new_mcq.id);
            assert_eq!(new.text, old.text);
            assert_eq!(new.position, old.position);
            assert_eq!(new.is_correct, old.is_correct);
        }
        assert_eq!(new_mcq.correct_option_ids().len(), 1);
    }
}
