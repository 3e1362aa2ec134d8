pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::attempt::Attempt;
use crate::models::test::Test;

pub use memory::InMemoryAssessmentStore;
pub use postgres::PgAssessmentStore;

/// Outcome of the decision made while the test is locked for attempt creation.
#[derive(Debug, Clone)]
pub enum AttemptStart {
    /// A new attempt to be inserted.
    Created(Attempt),
    /// An open attempt the student already had.
    Resumed(Attempt),
}

impl AttemptStart {
    pub fn attempt(&self) -> &Attempt {
        match self {
            AttemptStart::Created(a) | AttemptStart::Resumed(a) => a,
        }
    }

    pub fn into_attempt(self) -> Attempt {
        match self {
            AttemptStart::Created(a) | AttemptStart::Resumed(a) => a,
        }
    }
}

/// Persistence for tests and attempts.
///
/// The closure-taking methods are the read-modify-write primitives: they run
/// `decide`/`apply` while holding the relevant lock and persist the result
/// before releasing it. If the closure fails nothing is written.
#[async_trait]
pub trait AssessmentStore: Send + Sync + 'static {
    async fn insert_test(&self, test: &Test) -> Result<()>;

    async fn find_test(&self, test_id: Uuid) -> Result<Option<Test>>;

    /// Writes the test and upserts its questions and options by id.
    async fn save_test(&self, test: &Test) -> Result<()>;

    /// Locks the test, reads the student's attempts on it, and inserts the
    /// attempt `decide` creates.
    async fn start_attempt<F>(
        &self,
        test_id: Uuid,
        student_id: Uuid,
        decide: F,
    ) -> Result<AttemptStart>
    where
        F: FnOnce(&Test, &[Attempt]) -> Result<AttemptStart> + Send;

    async fn find_attempt(&self, attempt_id: Uuid) -> Result<Option<Attempt>>;

    /// Locks the attempt, hands it (with all answers) and its test to `apply`,
    /// then writes the attempt and every answer back.
    async fn update_attempt<F, R>(&self, attempt_id: Uuid, apply: F) -> Result<R>
    where
        F: FnOnce(&Test, &mut Attempt) -> Result<R> + Send,
        R: Send;

    async fn list_student_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<Vec<Attempt>>;

    async fn list_test_attempts(&self, test_id: Uuid) -> Result<Vec<Attempt>>;

    /// Attempts in `started` or `in_progress`.
    async fn list_open_attempts(&self) -> Result<Vec<Attempt>>;
}
