use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::put,
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::uploads::read_image_upload;
use crate::core::state::AppState;
use crate::schemas::submission::{AnswerKeyResponse, ImageResponse};
use crate::services::grading_request::GradingContext;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/answer-key", put(put_answer_key).get(get_answer_key).delete(delete_answer_key))
        .route("/context", put(put_context).get(get_context))
}

async fn put_answer_key(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnswerKeyResponse>, ApiError> {
    let upload = read_image_upload(multipart, state.settings().storage()).await?;
    let response = AnswerKeyResponse {
        configured: true,
        image: Some(ImageResponse::from_image(&upload.image)),
    };
    state.grader().set_answer_key(Some(upload.image)).await;
    Ok(Json(response))
}

async fn get_answer_key(State(state): State<AppState>) -> Json<AnswerKeyResponse> {
    let answer_key = state.grader().answer_key().await;
    Json(AnswerKeyResponse {
        configured: answer_key.is_some(),
        image: answer_key.as_ref().map(ImageResponse::from_image),
    })
}

async fn delete_answer_key(State(state): State<AppState>) -> StatusCode {
    state.grader().set_answer_key(None).await;
    StatusCode::NO_CONTENT
}

async fn put_context(
    State(state): State<AppState>,
    Json(payload): Json<GradingContext>,
) -> Result<Json<GradingContext>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    state.grader().set_context(payload.clone()).await;
    Ok(Json(payload))
}

async fn get_context(State(state): State<AppState>) -> Json<GradingContext> {
    Json(state.grader().context().await)
}
