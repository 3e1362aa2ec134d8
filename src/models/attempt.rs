use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::student_answer::{Response, StudentAnswer};
use crate::models::test::Test;
use crate::models::grade::LetterGrade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Started,
    InProgress,
    Submitted,
    Graded,
    Abandoned,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Started => "started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::Graded => "graded",
            AttemptStatus::Abandoned => "abandoned",
        }
    }

    /// Started and in-progress attempts still accept answers.
    pub fn is_open(&self) -> bool {
        matches!(self, AttemptStatus::Started | AttemptStatus::InProgress)
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "started" => Ok(AttemptStatus::Started),
            "in_progress" => Ok(AttemptStatus::InProgress),
            "submitted" => Ok(AttemptStatus::Submitted),
            "graded" => Ok(AttemptStatus::Graded),
            "abandoned" => Ok(AttemptStatus::Abandoned),
            other => Err(Error::InconsistentState(format!(
                "unknown attempt status '{}'",
                other
            ))),
        }
    }
}

/// Attempt-level totals. Written only by the score aggregator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttemptScores {
    pub(crate) auto_graded_score: Decimal,
    pub(crate) manual_graded_score: Decimal,
    pub(crate) total_score: Decimal,
    pub(crate) max_score: Decimal,
    pub(crate) percentage: Option<Decimal>,
    pub(crate) passed: Option<bool>,
}

impl AttemptScores {
    pub fn auto_graded_score(&self) -> Decimal {
        self.auto_graded_score
    }

    pub fn manual_graded_score(&self) -> Decimal {
        self.manual_graded_score
    }

    pub fn total_score(&self) -> Decimal {
        self.total_score
    }

    pub fn max_score(&self) -> Decimal {
        self.max_score
    }

    pub fn percentage(&self) -> Option<Decimal> {
        self.percentage
    }

    pub fn passed(&self) -> Option<bool> {
        self.passed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub(crate) submitted_at: Option<DateTime<Utc>>,
    pub(crate) graded_at: Option<DateTime<Utc>>,
    pub(crate) duration_seconds: Option<i64>,
    #[serde(flatten)]
    pub(crate) scores: AttemptScores,
    pub active: bool,
    pub(crate) answers: Vec<StudentAnswer>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Attempt {
    pub fn start(test_id: Uuid, student_id: Uuid, attempt_number: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            test_id,
            student_id,
            attempt_number,
            status: AttemptStatus::Started,
            started_at: now,
            submitted_at: None,
            graded_at: None,
            duration_seconds: None,
            scores: AttemptScores::default(),
            active: true,
            answers: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn graded_at(&self) -> Option<DateTime<Utc>> {
        self.graded_at
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.duration_seconds
    }

    pub fn scores(&self) -> &AttemptScores {
        &self.scores
    }

    pub fn answers(&self) -> &[StudentAnswer] {
        &self.answers
    }

    pub fn answer(&self, question_id: Uuid) -> Option<&StudentAnswer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    pub(crate) fn answer_mut(&mut self, question_id: Uuid) -> Option<&mut StudentAnswer> {
        self.answers.iter_mut().find(|a| a.question_id == question_id)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted_at.is_some()
    }

    pub fn letter_grade(&self) -> Option<LetterGrade> {
        self.scores.percentage.map(LetterGrade::from_percentage)
    }

    pub fn numeric_grade(&self) -> Option<u8> {
        self.letter_grade().map(|g| g.numeric())
    }

    /// Time the attempt must be submitted by, if the test has a duration limit.
    pub fn deadline(&self, test: &Test) -> Option<DateTime<Utc>> {
        test.duration_seconds
            .map(|secs| self.started_at + chrono::Duration::seconds(i64::from(secs)))
    }

    /// Stores or replaces the response for one question. The first write moves
    /// the attempt from `started` to `in_progress`.
    pub fn record_response(
        &mut self,
        question_id: Uuid,
        response: Response,
        now: DateTime<Utc>,
    ) -> Result<&StudentAnswer> {
        self.ensure_open("answer")?;
        if self.status == AttemptStatus::Started {
            self.status = AttemptStatus::InProgress;
        }
        self.updated_at = now;

        let attempt_id = self.id;
        let idx = match self.answers.iter().position(|a| a.question_id == question_id) {
            Some(idx) => idx,
            None => {
                self.answers.push(StudentAnswer::new(attempt_id, question_id));
                self.answers.len() - 1
            }
        };
        let answer = &mut self.answers[idx];
        answer.set_response(response, now);
        Ok(answer)
    }

    /// One-way transition into `submitted`.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.submitted_at.is_some() {
            return Err(Error::AlreadySubmitted);
        }
        if !self.is_open() {
            return Err(Error::InvalidTransition {
                status: self.status,
                action: "submit",
            });
        }
        self.submitted_at = Some(now);
        self.status = AttemptStatus::Submitted;
        self.duration_seconds = Some((now - self.started_at).num_seconds().max(0));
        self.updated_at = now;
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_open("abandon")?;
        self.status = AttemptStatus::Abandoned;
        self.updated_at = now;
        Ok(())
    }

    /// Adds an empty answer for every active question the student skipped, so
    /// each question in the test is represented once.
    pub(crate) fn fill_unanswered(&mut self, test: &Test) {
        for question in test.active_questions() {
            if self.answer(question.id).is_none() {
                let mut answer = StudentAnswer::new(self.id, question.id);
                answer.points_possible = question.points;
                self.answers.push(answer);
            }
        }
    }

    pub(crate) fn ensure_open(&self, action: &'static str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::InvalidTransition {
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    /// Fails once the test's time limit has run out for this attempt.
    pub(crate) fn ensure_before_deadline(&self, test: &Test, now: DateTime<Utc>) -> Result<()> {
        match self.deadline(test) {
            Some(deadline) if deadline <= now => Err(Error::TimeExpired),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_submitted(&self, action: &'static str) -> Result<()> {
        if self.submitted_at.is_none() {
            return Err(Error::InvalidTransition {
                status: self.status,
                action,
            });
        }
        Ok(())
    }

    pub(crate) fn mark_graded(&mut self, now: DateTime<Utc>) {
        if self.status == AttemptStatus::Submitted {
            self.status = AttemptStatus::Graded;
            self.graded_at = Some(now);
        }
    }
}
