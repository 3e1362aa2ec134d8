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
    dto::attempt_dto::{
        AttemptSummary, ManualGradePayload, PartialCreditPayload, RecordAnswerPayload,
    },
    error::Result,
    middleware::auth::Actor,
    repositories::AssessmentStore,
    AppState,
};

pub async fn questions<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let questions = state
        .attempt_service
        .questions_for_attempt(attempt_id, actor.id)
        .await?;
    Ok(Json(questions))
}

pub async fn record_answer<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<RecordAnswerPayload>,
) -> Result<impl IntoResponse> {
    let answer = state
        .attempt_service
        .record_answer(attempt_id, actor.id, payload.question_id, payload.response)
        .await?;
    Ok(Json(json!({
        "question_id": answer.question_id,
        "response": answer.response,
        "answered_at": answer.answered_at,
    })))
}

pub async fn submit<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state
        .attempt_service
        .submit_attempt(attempt_id, actor.id)
        .await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}

pub async fn review<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let review = state
        .attempt_service
        .review_attempt(attempt_id, actor.id)
        .await?;
    Ok(Json(review))
}

/// Full attempt including every answer, for staff.
pub async fn get_attempt<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state.attempt_service.get_attempt(attempt_id).await?;
    Ok(Json(attempt))
}

pub async fn deactivate<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.attempt_service.deactivate_attempt(attempt_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn auto_grade<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state.attempt_service.auto_grade_attempt(attempt_id).await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}

pub async fn manual_grade<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<Actor>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ManualGradePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let attempt = state
        .attempt_service
        .manual_grade_answer(
            attempt_id,
            question_id,
            actor.id,
            payload.points_earned,
            payload.feedback,
        )
        .await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}

pub async fn partial_credit<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<PartialCreditPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let attempt = state
        .attempt_service
        .award_partial_credit(attempt_id, question_id, payload.percentage)
        .await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}

pub async fn recompute<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let attempt = state.attempt_service.recompute_score(attempt_id).await?;
    Ok(Json(AttemptSummary::from(&attempt)))
}

pub async fn requires_manual_grading<S: AssessmentStore>(
    State(state): State<AppState<S>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let pending = state
        .attempt_service
        .requires_manual_grading(attempt_id)
        .await?;
    Ok(Json(json!({ "requires_manual_grading": pending })))
}
