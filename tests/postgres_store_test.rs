use std::env;
use std::sync::Arc;

use assessment_engine::{
    dto::test_dto::CreateTestPayload,
    error::Error,
    models::attempt::AttemptStatus,
    repositories::{AssessmentStore, PgAssessmentStore},
    services::manual_grading::GradingPolicy,
    utils::time::SystemClock,
    AppState,
};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn store() -> Arc<PgAssessmentStore> {
    dotenvy::dotenv().ok();
    let url = env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("pool");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");
    Arc::new(PgAssessmentStore::new(pool))
}

#[tokio::test]
#[ignore = "needs a live PostgreSQL database"]
async fn postgres_store_round_trips_a_graded_attempt() {
    let store = store().await;
    let state = AppState::new(store.clone(), Arc::new(SystemClock), GradingPolicy::default());

    let payload: CreateTestPayload = serde_json::from_value(json!({
        "title": "Physics",
        "passing_score": 70.0,
        "questions": [
            {
                "type": "multiple_choice",
                "text": "Unit of force",
                "points": 2.0,
                "options": [
                    { "text": "Newton", "is_correct": true },
                    { "text": "Joule" },
                    { "text": "Watt" }
                ]
            },
            {
                "type": "short_answer",
                "text": "Symbol for speed of light",
                "points": 1.0,
                "correct_answer": "c",
                "case_sensitive": true
            },
            { "type": "essay", "text": "Explain inertia", "points": 2.0 }
        ]
    }))
    .unwrap();
    let test = state.test_service.create_test(payload, None).await.unwrap();
    let test = state.test_service.publish_test(test.id).await.unwrap();

    let loaded = store.find_test(test.id).await.unwrap().unwrap();
    assert_eq!(loaded.questions.len(), 3);
    assert_eq!(loaded.questions[0].options().len(), 3);
    assert_eq!(loaded.questions[1].kind, test.questions[1].kind);

    let student = Uuid::new_v4();
    let attempt = state
        .attempt_service
        .start_attempt(test.id, student)
        .await
        .unwrap()
        .into_attempt();

    let newton = test.questions[0].options()[0].id;
    state
        .attempt_service
        .record_answer(attempt.id, student, test.questions[0].id, json!([newton]))
        .await
        .unwrap();
    state
        .attempt_service
        .record_answer(attempt.id, student, test.questions[1].id, json!("C"))
        .await
        .unwrap();

    let submitted = state.attempt_service.submit_attempt(attempt.id, student).await.unwrap();
    assert_eq!(submitted.status(), AttemptStatus::Submitted);
    assert_eq!(submitted.scores().auto_graded_score(), Decimal::from(2));

    let err = state
        .attempt_service
        .submit_attempt(attempt.id, student)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadySubmitted));

    let graded = state
        .attempt_service
        .manual_grade_answer(attempt.id, test.questions[2].id, Uuid::new_v4(), 2.0, None)
        .await
        .unwrap();
    assert_eq!(graded.status(), AttemptStatus::Graded);

    let stored = store.find_attempt(attempt.id).await.unwrap().unwrap();
    assert_eq!(stored.status(), AttemptStatus::Graded);
    assert!(stored.submitted_at().is_some());
    assert_eq!(stored.scores().total_score(), Decimal::from(4));
    assert_eq!(stored.scores().max_score(), Decimal::from(5));
    assert_eq!(stored.scores().percentage(), Some(Decimal::from(80)));
    assert_eq!(stored.scores().passed(), Some(true));
    assert_eq!(stored.answers().len(), 3);
}
