use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{AssessmentStore, AttemptStart};
use crate::error::{Error, Result};
use crate::models::attempt::Attempt;
use crate::models::test::Test;

#[derive(Debug, Default)]
struct State {
    tests: HashMap<Uuid, Test>,
    attempts: HashMap<Uuid, Attempt>,
}

/// Process-local store. One mutex covers all data, so every closure-taking
/// method is atomic with respect to every other call.
#[derive(Debug, Default)]
pub struct InMemoryAssessmentStore {
    state: Mutex<State>,
}

impl InMemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("assessment store lock poisoned".to_string()))
    }
}

fn sorted(mut attempts: Vec<Attempt>) -> Vec<Attempt> {
    attempts.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.attempt_number.cmp(&b.attempt_number))
    });
    attempts
}

#[async_trait]
impl AssessmentStore for InMemoryAssessmentStore {
    async fn insert_test(&self, test: &Test) -> Result<()> {
        let mut state = self.lock()?;
        if state.tests.contains_key(&test.id) {
            return Err(Error::BadRequest(format!("Test {} already exists", test.id)));
        }
        state.tests.insert(test.id, test.clone());
        Ok(())
    }

    async fn find_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        Ok(self.lock()?.tests.get(&test_id).cloned())
    }

    async fn save_test(&self, test: &Test) -> Result<()> {
        let mut state = self.lock()?;
        match state.tests.get_mut(&test.id) {
            Some(existing) => {
                *existing = test.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!("Test {} not found", test.id))),
        }
    }

    async fn start_attempt<F>(
        &self,
        test_id: Uuid,
        student_id: Uuid,
        decide: F,
    ) -> Result<AttemptStart>
    where
        F: FnOnce(&Test, &[Attempt]) -> Result<AttemptStart> + Send,
    {
        let mut state = self.lock()?;
        let test = state
            .tests
            .get(&test_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;
        let existing: Vec<Attempt> = sorted(
            state
                .attempts
                .values()
                .filter(|a| a.test_id == test_id && a.student_id == student_id)
                .cloned()
                .collect(),
        );

        let outcome = decide(&test, &existing)?;
        if let AttemptStart::Created(attempt) = &outcome {
            if existing.iter().any(|a| a.attempt_number == attempt.attempt_number) {
                return Err(Error::InconsistentState(format!(
                    "attempt number {} already used",
                    attempt.attempt_number
                )));
            }
            state.attempts.insert(attempt.id, attempt.clone());
        }
        Ok(outcome)
    }

    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>> {
        Ok(self.lock()?.attempts.get(&attempt_id).cloned())
    }

    async fn update_attempt<F, R>(&self, attempt_id: Uuid, apply: F) -> Result<R>
    where
        F: FnOnce(&Test, &mut Attempt) -> Result<R> + Send,
        R: Send,
    {
        let mut state = self.lock()?;
        let mut attempt = state
            .attempts
            .get(&attempt_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))?;
        let test = state.tests.get(&attempt.test_id).ok_or_else(|| {
            Error::InconsistentState(format!(
                "attempt {} references missing test {}",
                attempt_id, attempt.test_id
            ))
        })?;

        let first_submission = attempt.submitted_at;
        let result = apply(test, &mut attempt)?;
        if first_submission.is_some() {
            attempt.submitted_at = first_submission;
        }
        state.attempts.insert(attempt_id, attempt);
        Ok(result)
    }

    async fn list_student_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>> {
        let state = self.lock()?;
        Ok(sorted(
            state
                .attempts
                .values()
                .filter(|a| a.test_id == test_id && a.student_id == student_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_test_attempts(&self, test_id: Uuid) -> Result<Vec<Attempt>> {
        let state = self.lock()?;
        Ok(sorted(
            state
                .attempts
                .values()
                .filter(|a| a.test_id == test_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_open_attempts(&self) -> Result<Vec<Attempt>> {
        let state = self.lock()?;
        Ok(sorted(
            state
                .attempts
                .values()
                .filter(|a| a.is_open())
                .cloned()
                .collect(),
        ))
    }
}
