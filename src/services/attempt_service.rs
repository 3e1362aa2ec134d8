use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::dto::attempt_dto::{
    AttemptQuestion, AttemptReview, AttemptSummary, OptionView, ReviewItem,
};
use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::question::{Question, QuestionKind};
use crate::models::student_answer::{Response, StudentAnswer};
use crate::models::test::Test;
use crate::repositories::{AssessmentStore, AttemptStart};
use crate::services::answer_checker::{auto_grade, coerce_response};
use crate::services::eligibility::{self, Eligibility};
use crate::services::manual_grading::{self, GradingPolicy};
use crate::services::score_aggregator::{recompute_attempt_score, round_score};
use crate::utils::time::Clock;

fn ensure_owner(attempt: &Attempt, student_id: Uuid) -> Result<()> {
    if attempt.student_id != student_id {
        return Err(Error::NotFound(format!("Attempt {} not found", attempt.id)));
    }
    Ok(())
}

fn find_question(test: &Test, question_id: Uuid) -> Result<&Question> {
    test.question(question_id)
        .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))
}

fn missing_answer(question_id: Uuid) -> Error {
    Error::NotFound(format!("No answer to question {} in this attempt", question_id))
}

fn to_decimal(value: f64, field: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(round_score)
        .ok_or_else(|| Error::Validation(format!("Invalid {}: {}", field, value)))
}

/// Auto-grades every answer that has not been graded by a person. Ungraded
/// essays only get their `points_possible` refreshed.
fn auto_grade_answers(test: &Test, attempt: &mut Attempt, now: DateTime<Utc>) -> Result<usize> {
    let mut graded = 0;
    for answer in attempt.answers.iter_mut() {
        let Some(question) = test.question(answer.question_id) else {
            tracing::warn!(
                attempt_id = %answer.attempt_id,
                question_id = %answer.question_id,
                "answer references a question that no longer exists"
            );
            continue;
        };
        if answer.manually_graded {
            continue;
        }
        answer.points_possible = question.points;
        match auto_grade(question, answer, now) {
            Ok(()) => graded += 1,
            Err(Error::NotAutoGradable) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(graded)
}

fn student_view(
    question: &Question,
    shuffle_answers: bool,
    rng: &mut StdRng,
    answer: Option<&StudentAnswer>,
) -> AttemptQuestion {
    let mut options: Vec<_> = question.options().to_vec();
    options.sort_by_key(|o| o.position);
    if shuffle_answers {
        options.shuffle(rng);
    }
    let allow_multiple = match &question.kind {
        QuestionKind::MultipleChoice { allow_multiple, .. } => Some(*allow_multiple),
        _ => None,
    };
    AttemptQuestion {
        id: question.id,
        text: question.text.clone(),
        question_type: question.question_type(),
        points: question.points,
        is_required: question.is_required,
        allow_multiple,
        options: options
            .into_iter()
            .map(|o| OptionView { id: o.id, text: o.text })
            .collect(),
        response: answer.and_then(|a| a.response.clone()),
    }
}

fn correct_answer(question: &Question) -> Option<Response> {
    match &question.kind {
        QuestionKind::MultipleChoice { options, .. } => {
            let mut correct: Vec<_> = options.iter().filter(|o| o.is_correct).collect();
            correct.sort_by_key(|o| o.position);
            Some(Response::SelectedOptions(correct.into_iter().map(|o| o.id).collect()))
        }
        QuestionKind::TrueFalse { correct_answer } => Some(Response::Boolean(*correct_answer)),
        QuestionKind::ShortAnswer { correct_answer, .. } => {
            Some(Response::Text(correct_answer.clone()))
        }
        QuestionKind::Essay => None,
    }
}

/// Attempt lifecycle: starting, answering, submission, grading and review.
pub struct AttemptService<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: GradingPolicy,
}

impl<S> Clone for AttemptService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            policy: self.policy,
        }
    }
}

impl<S: AssessmentStore> AttemptService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, policy: GradingPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    async fn load_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .find_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }

    pub async fn check_eligibility(&self, test_id: Uuid, student_id: Uuid) -> Result<Eligibility> {
        let test = self.load_test(test_id).await?;
        let attempts = self.store.list_student_attempts(test_id, student_id).await?;
        Ok(eligibility::can_start_attempt(
            &test,
            student_id,
            &attempts,
            self.clock.now(),
        ))
    }

    /// Starts a new attempt, or hands back the student's open one. The
    /// eligibility gate is evaluated again while the test is locked.
    pub async fn start_attempt(&self, test_id: Uuid, student_id: Uuid) -> Result<AttemptStart> {
        let now = self.clock.now();
        let outcome = self
            .store
            .start_attempt(test_id, student_id, move |test, existing| {
                if let Some(open) = existing.iter().find(|a| a.active && a.is_open()) {
                    return Ok(AttemptStart::Resumed(open.clone()));
                }
                let gate = eligibility::can_start_attempt(test, student_id, existing, now);
                if let Some(reason) = gate.reason {
                    return Err(Error::NotEligible(reason));
                }
                let number = eligibility::next_attempt_number(existing, test.id, student_id);
                Ok(AttemptStart::Created(Attempt::start(
                    test.id, student_id, number, now,
                )))
            })
            .await;

        match &outcome {
            Ok(AttemptStart::Created(a)) => tracing::info!(
                attempt_id = %a.id,
                test_id = %test_id,
                student_id = %student_id,
                attempt_number = a.attempt_number,
                "attempt started"
            ),
            Ok(AttemptStart::Resumed(a)) => tracing::info!(
                attempt_id = %a.id,
                test_id = %test_id,
                student_id = %student_id,
                "attempt resumed"
            ),
            Err(Error::NotEligible(reason)) => tracing::info!(
                test_id = %test_id,
                student_id = %student_id,
                reason = %reason,
                "attempt refused"
            ),
            Err(_) => {}
        }
        outcome
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        self.load_attempt(attempt_id).await
    }

    pub async fn record_answer(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
        question_id: Uuid,
        value: JsonValue,
    ) -> Result<StudentAnswer> {
        let now = self.clock.now();
        self.store
            .update_attempt(attempt_id, move |test, attempt| {
                ensure_owner(attempt, student_id)?;
                attempt.ensure_open("answer")?;
                attempt.ensure_before_deadline(test, now)?;
                let question = test
                    .question(question_id)
                    .filter(|q| q.active)
                    .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))?;
                let response = coerce_response(question, &value)?;
                let points = question.points;
                let answer = attempt.record_response(question_id, response, now)?;
                let mut answer = answer.clone();
                answer.points_possible = points;
                if let Some(stored) = attempt.answer_mut(question_id) {
                    stored.points_possible = points;
                }
                Ok(answer)
            })
            .await
    }

    /// Submits the attempt and grades it in the same critical section. A
    /// second submission fails with [`Error::AlreadySubmitted`] and writes
    /// nothing. Past the time limit the attempt is left for the abandonment
    /// sweep and [`Error::TimeExpired`] is returned.
    pub async fn submit_attempt(&self, attempt_id: Uuid, student_id: Uuid) -> Result<Attempt> {
        let now = self.clock.now();
        let attempt = self
            .store
            .update_attempt(attempt_id, move |test, attempt| {
                ensure_owner(attempt, student_id)?;
                if attempt.is_open() {
                    attempt.ensure_before_deadline(test, now)?;
                }
                attempt.submit(now)?;
                attempt.fill_unanswered(test);
                auto_grade_answers(test, attempt, now)?;
                recompute_attempt_score(attempt, test, now);
                Ok(attempt.clone())
            })
            .await?;

        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            status = %attempt.status(),
            total_score = %attempt.scores().total_score(),
            "attempt submitted"
        );
        Ok(attempt)
    }

    /// Re-runs auto-grading on a submitted attempt. Manually graded answers are kept.
    pub async fn auto_grade_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        let now = self.clock.now();
        self.store
            .update_attempt(attempt_id, move |test, attempt| {
                attempt.ensure_submitted("auto-grade")?;
                let graded = auto_grade_answers(test, attempt, now)?;
                recompute_attempt_score(attempt, test, now);
                tracing::debug!(attempt_id = %attempt.id, graded, "auto-grading rerun");
                Ok(attempt.clone())
            })
            .await
    }

    pub async fn manual_grade_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        grader_id: Uuid,
        points_earned: f64,
        feedback: Option<String>,
    ) -> Result<Attempt> {
        let now = self.clock.now();
        let policy = self.policy;
        let points_earned = to_decimal(points_earned, "points")?;
        let attempt = self
            .store
            .update_attempt(attempt_id, move |test, attempt| {
                attempt.ensure_submitted("grade")?;
                let question = find_question(test, question_id)?;
                let answer = attempt
                    .answer_mut(question_id)
                    .ok_or_else(|| missing_answer(question_id))?;
                manual_grading::manual_grade(
                    &policy,
                    question,
                    answer,
                    points_earned,
                    grader_id,
                    feedback,
                    now,
                );
                recompute_attempt_score(attempt, test, now);
                Ok(attempt.clone())
            })
            .await?;

        tracing::info!(
            attempt_id = %attempt.id,
            question_id = %question_id,
            grader_id = %grader_id,
            "manual grade applied"
        );
        Ok(attempt)
    }

    pub async fn award_partial_credit(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        percentage: f64,
    ) -> Result<Attempt> {
        let now = self.clock.now();
        let policy = self.policy;
        let percentage = to_decimal(percentage, "percentage")?;
        let attempt = self
            .store
            .update_attempt(attempt_id, move |test, attempt| {
                attempt.ensure_submitted("grade")?;
                let question = find_question(test, question_id)?;
                let answer = attempt
                    .answer_mut(question_id)
                    .ok_or_else(|| missing_answer(question_id))?;
                manual_grading::award_partial_credit(&policy, question, answer, percentage, now)?;
                recompute_attempt_score(attempt, test, now);
                Ok(attempt.clone())
            })
            .await?;

        tracing::info!(
            attempt_id = %attempt.id,
            question_id = %question_id,
            percentage = %percentage,
            "partial credit awarded"
        );
        Ok(attempt)
    }

    pub async fn recompute_score(&self, attempt_id: Uuid) -> Result<Attempt> {
        let now = self.clock.now();
        self.store
            .update_attempt(attempt_id, move |test, attempt| {
                recompute_attempt_score(attempt, test, now);
                Ok(attempt.clone())
            })
            .await
    }

    pub async fn can_retake(&self, test_id: Uuid, student_id: Uuid) -> Result<bool> {
        let test = self.load_test(test_id).await?;
        let attempts = self.store.list_student_attempts(test_id, student_id).await?;
        Ok(eligibility::can_retake(&test, student_id, &attempts))
    }

    pub async fn requires_manual_grading(&self, attempt_id: Uuid) -> Result<bool> {
        let attempt = self.load_attempt(attempt_id).await?;
        let test = self.load_test(attempt.test_id).await?;
        Ok(eligibility::requires_manual_grading(&test, &attempt))
    }

    /// The questions of the attempt as the student sees them. Shuffling is
    /// seeded by the attempt id, so every call returns the same order.
    pub async fn questions_for_attempt(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
    ) -> Result<Vec<AttemptQuestion>> {
        let attempt = self.load_attempt(attempt_id).await?;
        ensure_owner(&attempt, student_id)?;
        let test = self.load_test(attempt.test_id).await?;

        let mut rng = StdRng::seed_from_u64(attempt.id.as_u128() as u64);
        let mut questions: Vec<&Question> = test.active_questions().collect();
        questions.sort_by_key(|q| q.position);
        if test.shuffle_questions {
            questions.shuffle(&mut rng);
        }

        Ok(questions
            .into_iter()
            .map(|q| student_view(q, test.shuffle_answers, &mut rng, attempt.answer(q.id)))
            .collect())
    }

    pub async fn review_attempt(
        &self,
        attempt_id: Uuid,
        student_id: Uuid,
    ) -> Result<AttemptReview> {
        let attempt = self.load_attempt(attempt_id).await?;
        ensure_owner(&attempt, student_id)?;
        attempt.ensure_submitted("review")?;
        let test = self.load_test(attempt.test_id).await?;
        if !test.allow_review {
            return Err(Error::Forbidden("Review is not allowed for this test".to_string()));
        }

        let positions: HashMap<Uuid, i32> =
            test.questions.iter().map(|q| (q.id, q.position)).collect();
        let mut answers: Vec<&StudentAnswer> = attempt.answers().iter().collect();
        answers.sort_by_key(|a| positions.get(&a.question_id).copied().unwrap_or(i32::MAX));

        let items = answers
            .into_iter()
            .filter_map(|answer| {
                let question = test.question(answer.question_id)?;
                Some(ReviewItem {
                    question_id: question.id,
                    text: question.text.clone(),
                    question_type: question.question_type(),
                    response: answer.response.clone(),
                    points_earned: answer.points_earned,
                    points_possible: answer.points_possible,
                    is_correct: answer.is_correct,
                    feedback: answer.feedback.clone(),
                    correct_answer: if test.show_correct_answers {
                        correct_answer(question)
                    } else {
                        None
                    },
                })
            })
            .collect();

        Ok(AttemptReview {
            attempt: AttemptSummary::from(&attempt),
            items,
        })
    }

    /// Submitted attempts on the test that still have an essay to grade.
    pub async fn list_attempts_for_review(&self, test_id: Uuid) -> Result<Vec<Attempt>> {
        let test = self.load_test(test_id).await?;
        let attempts = self.store.list_test_attempts(test_id).await?;
        Ok(attempts
            .into_iter()
            .filter(|a| a.active && a.is_submitted())
            .filter(|a| eligibility::requires_manual_grading(&test, a))
            .collect())
    }

    /// Soft-deletes the attempt so it no longer counts against the limit.
    pub async fn deactivate_attempt(&self, attempt_id: Uuid) -> Result<Attempt> {
        let now = self.clock.now();
        self.store
            .update_attempt(attempt_id, move |_, attempt| {
                attempt.active = false;
                attempt.updated_at = now;
                Ok(attempt.clone())
            })
            .await
    }

    /// Moves every open attempt whose time limit has run out to `abandoned`.
    /// Returns how many attempts were abandoned.
    pub async fn abandon_expired_attempts(&self, now: DateTime<Utc>) -> Result<usize> {
        let open = self.store.list_open_attempts().await?;
        let mut tests: HashMap<Uuid, Option<Test>> = HashMap::new();
        let mut abandoned = 0;

        for attempt in open {
            if !tests.contains_key(&attempt.test_id) {
                let test = self.store.find_test(attempt.test_id).await?;
                tests.insert(attempt.test_id, test);
            }
            let Some(Some(test)) = tests.get(&attempt.test_id) else {
                continue;
            };
            if !attempt.deadline(test).map_or(false, |deadline| deadline <= now) {
                continue;
            }

            let result = self
                .store
                .update_attempt(attempt.id, move |test, attempt| {
                    let expired = attempt.deadline(test).map_or(false, |d| d <= now);
                    if !attempt.is_open() || !expired {
                        return Ok(false);
                    }
                    attempt.abandon(now)?;
                    Ok(true)
                })
                .await;

            match result {
                Ok(true) => {
                    abandoned += 1;
                    tracing::info!(
                        attempt_id = %attempt.id,
                        test_id = %attempt.test_id,
                        student_id = %attempt.student_id,
                        "attempt abandoned after its time limit"
                    );
                }
                Ok(false) => {}
                Err(e) => tracing::error!(
                    attempt_id = %attempt.id,
                    error = %e,
                    "failed to abandon attempt"
                ),
            }
        }
        Ok(abandoned)
    }
}
