use std::sync::Arc;

use assessment_engine::{
    middleware::auth::AuthKeys, repositories::InMemoryAssessmentStore, routes,
    services::manual_grading::GradingPolicy, utils::time::SystemClock, AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "api-test-secret";

fn app() -> Router {
    let state = AppState::new(
        Arc::new(InMemoryAssessmentStore::new()),
        Arc::new(SystemClock),
        GradingPolicy::default(),
    );
    routes::router(state, AuthKeys::new(SECRET))
}

fn token(actor: Uuid, role: Option<&str>) -> String {
    AuthKeys::new(SECRET)
        .issue(actor, role, Duration::minutes(10))
        .unwrap()
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header("Authorization", format!("Bearer {}", t));
    }
    let req = match body {
        Some(b) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get(app: &Router, uri: &str, bearer: &str) -> (StatusCode, JsonValue) {
    send(app, "GET", uri, Some(bearer), None).await
}

async fn post(app: &Router, uri: &str, bearer: &str) -> (StatusCode, JsonValue) {
    send(app, "POST", uri, Some(bearer), None).await
}

#[tokio::test]
async fn health_needs_no_token() {
    let app = app();
    let (status, body) = send(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn authoring_requires_a_staff_token() {
    let app = app();
    let payload = json!({ "title": "Draft", "questions": [] });

    let (status, body) = send(&app, "POST", "/api/tests", None, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing_authorization");

    let garbage = Some("garbage");
    let (status, body) = send(&app, "POST", "/api/tests", garbage, Some(payload.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    let student = token(Uuid::new_v4(), Some("student"));
    let (status, _) =
        send(&app, "POST", "/api/tests", Some(&student), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let staff = token(Uuid::new_v4(), Some("employee"));
    let (status, body) = send(&app, "POST", "/api/tests", Some(&staff), Some(payload)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_published"], false);
}

#[tokio::test]
async fn invalid_payload_is_a_bad_request() {
    let app = app();
    let staff = token(Uuid::new_v4(), Some("admin"));
    let payload = json!({ "title": "", "attempt_limit": 0 });
    let (status, _) = send(&app, "POST", "/api/tests", Some(&staff), Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn student_takes_a_test_and_staff_grades_it() {
    let app = app();
    let staff = token(Uuid::new_v4(), Some("employee"));
    let student_id = Uuid::new_v4();
    let student = token(student_id, None);

    let body = json!({
        "title": "History",
        "passing_score": 50.0,
        "questions": [
            {
                "type": "true_false",
                "text": "Rome was founded before Carthage",
                "points": 1.0,
                "correct_answer": false
            },
            { "type": "essay", "text": "Explain the Punic wars", "points": 4.0 }
        ]
    });
    let (status, test) = send(&app, "POST", "/api/tests", Some(&staff), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let test_id = test["id"].as_str().unwrap().to_string();
    let tf_id = test["questions"][0]["id"].as_str().unwrap().to_string();
    let essay_id = test["questions"][1]["id"].as_str().unwrap().to_string();
    let attempts_uri = format!("/api/tests/{}/attempts", test_id);

    let (status, body) = post(&app, &attempts_uri, &student).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "NOT_PUBLISHED");

    let (status, _) = post(&app, &format!("/api/tests/{}/publish", test_id), &staff).await;
    assert_eq!(status, StatusCode::OK);

    let eligibility_uri = format!("/api/tests/{}/eligibility", test_id);
    let (_, eligibility) = get(&app, &eligibility_uri, &student).await;
    assert_eq!(eligibility["allowed"], true);
    assert_eq!(eligibility["remaining_attempts"], 1);

    let (status, started) = post(&app, &attempts_uri, &student).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(started["resumed"], false);
    let attempt_id = started["attempt"]["id"].as_str().unwrap().to_string();

    let (status, resumed) = post(&app, &attempts_uri, &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(resumed["attempt"]["id"], attempt_id.as_str());

    let questions_uri = format!("/api/attempts/{}/questions", attempt_id);
    let (status, questions) = get(&app, &questions_uri, &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(questions.as_array().unwrap().len(), 2);
    assert!(questions[0].get("correct_answer").is_none());

    let answers_uri = format!("/api/attempts/{}/answers", attempt_id);
    let tf_answer = json!({ "question_id": tf_id, "response": false });
    let (status, _) = send(&app, "PUT", &answers_uri, Some(&student), Some(tf_answer)).await;
    assert_eq!(status, StatusCode::OK);

    let essay_answer = json!({
        "question_id": essay_id,
        "response": "Three wars over the western Mediterranean."
    });
    let (status, _) = send(&app, "PUT", &answers_uri, Some(&student), Some(essay_answer)).await;
    assert_eq!(status, StatusCode::OK);

    let submit_uri = format!("/api/attempts/{}/submit", attempt_id);
    let (status, submitted) = post(&app, &submit_uri, &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["status"], "submitted");

    let (status, body) = post(&app, &submit_uri, &student).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_submitted");

    let (_, queue) = get(&app, &format!("/api/tests/{}/review-queue", test_id), &staff).await;
    assert_eq!(queue["total"], 1);

    let grade_uri = format!("/api/attempts/{}/answers/{}/grade", attempt_id, essay_id);
    let grade = json!({ "points_earned": 3.0, "feedback": "Solid overview" });
    let (status, graded) = send(&app, "POST", &grade_uri, Some(&staff), Some(grade)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(graded["status"], "graded");
    assert_eq!(graded["letter_grade"], "B");
    assert_eq!(graded["numeric_grade"], 4);
    assert_eq!(graded["passed"], true);

    let review_uri = format!("/api/attempts/{}/review", attempt_id);
    let (status, review) = get(&app, &review_uri, &student).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(review["items"].as_array().unwrap().len(), 2);
    assert!(review["items"][0].get("correct_answer").is_none());

    let (_, retake) = get(&app, &format!("/api/tests/{}/can-retake", test_id), &student).await;
    assert_eq!(retake["can_retake"], false);
}

#[tokio::test]
async fn other_students_cannot_touch_an_attempt() {
    let app = app();
    let staff = token(Uuid::new_v4(), Some("admin"));
    let body = json!({
        "title": "Short",
        "questions": [{
            "type": "short_answer",
            "text": "Largest planet",
            "points": 1.0,
            "correct_answer": "Jupiter"
        }]
    });
    let (_, test) = send(&app, "POST", "/api/tests", Some(&staff), Some(body)).await;
    let test_id = test["id"].as_str().unwrap().to_string();
    post(&app, &format!("/api/tests/{}/publish", test_id), &staff).await;

    let owner = token(Uuid::new_v4(), None);
    let (_, started) = post(&app, &format!("/api/tests/{}/attempts", test_id), &owner).await;
    let attempt_id = started["attempt"]["id"].as_str().unwrap().to_string();

    let intruder = token(Uuid::new_v4(), None);
    let submit_uri = format!("/api/attempts/{}/submit", attempt_id);
    let (status, _) = post(&app, &submit_uri, &intruder).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
