use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        attempt_dto::{AttemptSummary, StartAttemptResponse},
        test_dto::{CreateQuestionPayload, CreateTestPayload, UpdateQuestionPayload},
    },
    error::Result,
    middleware::auth::Actor,
    repositories::{AssessmentStore, AttemptStart},
    AppState,
};

pub async fn create_test<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let test = state.test_service.create_test(payload, Some(actor.id)).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn get_test<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.get_test(test_id).await?;
    Ok(Json(test))
}

pub async fn add_question<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(test_id): Path<Uuid>,
    Json(payload): Json<CreateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state.test_service.add_question(test_id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

pub async fn update_question<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path((test_id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = state
        .test_service
        .update_question(test_id, question_id, payload)
        .await?;
    Ok(Json(question))
}

pub async fn deactivate_question<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path((test_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse> {
    state
        .test_service
        .deactivate_question(test_id, question_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_test<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.publish_test(test_id).await?;
    Ok(Json(json!({
        "id": test.id,
        "is_published": test.is_published,
        "published_at": test.published_at,
    })))
}

pub async fn unpublish_test<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.unpublish_test(test_id).await?;
    Ok(Json(json!({
        "id": test.id,
        "is_published": test.is_published,
        "published_at": test.published_at,
    })))
}

pub async fn duplicate_test<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let copy = state.test_service.duplicate_test(test_id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn review_queue<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempts = state.attempt_service.list_attempts_for_review(test_id).await?;
    let items: Vec<AttemptSummary> = attempts.iter().map(AttemptSummary::from).collect();
    Ok(Json(json!({ "items": items, "total": items.len() })))
}

pub async fn check_eligibility<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let eligibility = state
        .attempt_service
        .check_eligibility(test_id, actor.id)
        .await?;
    Ok(Json(eligibility))
}

pub async fn can_retake<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let allowed = state.attempt_service.can_retake(test_id, actor.id).await?;
    Ok(Json(json!({ "can_retake": allowed })))
}

pub async fn start_attempt<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state.attempt_service.start_attempt(test_id, actor.id).await?;
    let (status, resumed) = match &outcome {
        AttemptStart::Created(_) => (StatusCode::CREATED, false),
        AttemptStart::Resumed(_) => (StatusCode::OK, true),
    };
    let body = StartAttemptResponse {
        resumed,
        attempt: AttemptSummary::from(outcome.attempt()),
    };
    Ok((status, Json(body)))
}
