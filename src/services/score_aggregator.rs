use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::attempt::{Attempt, AttemptScores};
use crate::models::test::Test;

/// Scores are kept at two decimal places, midpoint away from zero.
pub fn round_score(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Derives attempt totals from the answers alone.
pub fn compute_scores(attempt: &Attempt, passing_score: Option<Decimal>) -> AttemptScores {
    let mut scores = AttemptScores::default();
    for answer in attempt.answers() {
        if answer.manually_graded {
            scores.manual_graded_score += answer.points_earned;
        } else {
            scores.auto_graded_score += answer.points_earned;
        }
        scores.max_score += answer.points_possible;
    }
    scores.total_score = scores.auto_graded_score + scores.manual_graded_score;

    scores.percentage = if scores.max_score > Decimal::ZERO {
        Some(round_score(scores.total_score * Decimal::ONE_HUNDRED / scores.max_score))
    } else {
        None
    };
    scores.passed = match (scores.percentage, passing_score) {
        (Some(percentage), Some(passing)) => Some(percentage >= passing),
        _ => None,
    };
    scores
}

/// Recomputes every derived score field of the attempt from its current
/// answer set and promotes a submitted attempt to `graded` once no answer is
/// left ungraded. Safe to call any number of times.
pub fn recompute_attempt_score(attempt: &mut Attempt, test: &Test, now: DateTime<Utc>) {
    if attempt.answers().is_empty() {
        tracing::warn!(
            attempt_id = %attempt.id,
            test_id = %test.id,
            "recomputing score of an attempt without answers; treating as zero"
        );
    }

    attempt.scores = compute_scores(attempt, test.passing_score);

    if attempt.answers().iter().all(|a| a.is_graded()) {
        let was_graded = attempt.graded_at().is_some();
        attempt.mark_graded(now);
        if !was_graded && attempt.graded_at().is_some() {
            tracing::info!(
                attempt_id = %attempt.id,
                total_score = %attempt.scores.total_score,
                max_score = %attempt.scores.max_score,
                "attempt fully graded"
            );
        }
    }
    attempt.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::student_answer::StudentAnswer;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn graded(attempt: &Attempt, earned: i64, possible: i64, manual: bool) -> StudentAnswer {
        let mut answer = StudentAnswer::new(attempt.id, Uuid::new_v4());
        answer.points_earned = Decimal::from(earned);
        answer.points_possible = Decimal::from(possible);
        answer.is_correct = Some(earned * 2 >= possible);
        answer.manually_graded = manual;
        answer
    }

    fn submitted_attempt() -> Attempt {
        let start = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut attempt = Attempt::start(Uuid::new_v4(), Uuid::new_v4(), 1, start);
        attempt.submit(start + chrono::Duration::minutes(20)).unwrap();
        attempt
    }

    #[test]
    fn totals_split_by_grading_source() {
        let mut attempt = submitted_attempt();
        let a = graded(&attempt, 2, 2, false);
        let b = graded(&attempt, 1, 3, true);
        attempt.answers = vec![a, b];

        let scores = compute_scores(&attempt, Some(Decimal::from(50)));
        assert_eq!(scores.auto_graded_score(), Decimal::from(2));
        assert_eq!(scores.manual_graded_score(), Decimal::from(1));
        assert_eq!(scores.total_score(), Decimal::from(3));
        assert_eq!(scores.max_score(), Decimal::from(5));
        assert_eq!(scores.percentage(), Some(Decimal::from(60)));
        assert_eq!(scores.passed(), Some(true));
    }

    #[test]
    fn percentage_is_rounded_to_two_places() {
        let mut attempt = submitted_attempt();
        let a = graded(&attempt, 1, 3, false);
        attempt.answers = vec![a];
        let scores = compute_scores(&attempt, None);
        assert_eq!(scores.percentage(), Some(Decimal::new(3333, 2)));
        assert_eq!(scores.passed(), None);
    }

    #[test]
    fn zero_max_score_leaves_percentage_empty() {
        let attempt = submitted_attempt();
        let scores = compute_scores(&attempt, Some(Decimal::from(50)));
        assert_eq!(scores.total_score(), Decimal::ZERO);
        assert_eq!(scores.percentage(), None);
        assert_eq!(scores.passed(), None);
    }
}
