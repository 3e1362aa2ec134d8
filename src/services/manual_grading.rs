use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::student_answer::StudentAnswer;
use crate::services::score_aggregator::round_score;

/// How a human-awarded score is turned into a correctness flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradingPolicy {
    /// Share of the possible points, in percent, from which an answer counts as correct.
    pub correct_threshold_percent: Decimal,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            correct_threshold_percent: Decimal::from(50),
        }
    }
}

impl GradingPolicy {
    pub fn new(correct_threshold_percent: Decimal) -> Self {
        Self {
            correct_threshold_percent,
        }
    }

    fn is_correct(&self, points_earned: Decimal, points_possible: Decimal) -> bool {
        if points_possible <= Decimal::ZERO {
            return false;
        }
        points_earned * Decimal::ONE_HUNDRED / points_possible >= self.correct_threshold_percent
    }
}

/// Applies a grader's score to one answer, clamped to the question's points.
pub fn manual_grade(
    policy: &GradingPolicy,
    question: &Question,
    answer: &mut StudentAnswer,
    points_earned: Decimal,
    grader_id: Uuid,
    feedback: Option<String>,
    now: DateTime<Utc>,
) {
    let points_possible = question.points;
    let points_earned = round_score(points_earned).max(Decimal::ZERO).min(points_possible);

    answer.points_possible = points_possible;
    answer.points_earned = points_earned;
    answer.is_correct = Some(policy.is_correct(points_earned, points_possible));
    answer.manually_graded = true;
    answer.graded_by_employee_id = Some(grader_id);
    answer.graded_at = Some(now);
    if feedback.is_some() {
        answer.feedback = feedback;
    }
    answer.answered_at = answer.answered_at.or(Some(now));
}

/// Awards a percentage of the question's points without a named grader.
pub fn award_partial_credit(
    policy: &GradingPolicy,
    question: &Question,
    answer: &mut StudentAnswer,
    percentage: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Err(Error::Validation(format!(
            "Partial credit must be between 0 and 100 percent, got {}",
            percentage
        )));
    }

    let points_possible = question.points;
    answer.points_possible = points_possible;
    answer.points_earned = round_score(points_possible * percentage / Decimal::ONE_HUNDRED);
    answer.is_correct = Some(percentage >= policy.correct_threshold_percent);
    answer.manually_graded = true;
    answer.graded_at = Some(now);
    answer.answered_at = answer.answered_at.or(Some(now));
    Ok(())
}
