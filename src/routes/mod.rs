pub mod attempt_routes;
pub mod health;
pub mod test_routes;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
    Router,
};

use crate::{middleware::auth, repositories::AssessmentStore, AppState};

/// Authoring and grading endpoints. Require a staff token.
fn staff_api<S: AssessmentStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/tests", post(test_routes::create_test::<S>))
        .route("/api/tests/:id", get(test_routes::get_test::<S>))
        .route("/api/tests/:id/questions", post(test_routes::add_question::<S>))
        .route(
            "/api/tests/:id/questions/:question_id",
            patch(test_routes::update_question::<S>).delete(test_routes::deactivate_question::<S>),
        )
        .route("/api/tests/:id/publish", post(test_routes::publish_test::<S>))
        .route("/api/tests/:id/unpublish", post(test_routes::unpublish_test::<S>))
        .route("/api/tests/:id/duplicate", post(test_routes::duplicate_test::<S>))
        .route("/api/tests/:id/review-queue", get(test_routes::review_queue::<S>))
        .route(
            "/api/attempts/:id",
            get(attempt_routes::get_attempt::<S>).delete(attempt_routes::deactivate::<S>),
        )
        .route("/api/attempts/:id/auto-grade", post(attempt_routes::auto_grade::<S>))
        .route("/api/attempts/:id/recompute", post(attempt_routes::recompute::<S>))
        .route(
            "/api/attempts/:id/requires-manual-grading",
            get(attempt_routes::requires_manual_grading::<S>),
        )
        .route(
            "/api/attempts/:id/answers/:question_id/grade",
            post(attempt_routes::manual_grade::<S>),
        )
        .route(
            "/api/attempts/:id/answers/:question_id/partial-credit",
            post(attempt_routes::partial_credit::<S>),
        )
        .route_layer(from_fn(auth::require_staff))
}

/// Endpoints acting on behalf of the student in the token.
fn student_api<S: AssessmentStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/api/tests/:id/eligibility", get(test_routes::check_eligibility::<S>))
        .route("/api/tests/:id/can-retake", get(test_routes::can_retake::<S>))
        .route("/api/tests/:id/attempts", post(test_routes::start_attempt::<S>))
        .route("/api/attempts/:id/questions", get(attempt_routes::questions::<S>))
        .route("/api/attempts/:id/answers", put(attempt_routes::record_answer::<S>))
        .route("/api/attempts/:id/submit", post(attempt_routes::submit::<S>))
        .route("/api/attempts/:id/review", get(attempt_routes::review::<S>))
}

pub fn router<S: AssessmentStore>(state: AppState<S>, keys: auth::AuthKeys) -> Router {
    let api = staff_api::<S>()
        .merge(student_api::<S>())
        .route_layer(from_fn_with_state(keys, auth::require_bearer_auth));

    Router::new()
        .route("/health", get(health::health))
        .merge(api)
        .with_state(state)
}
