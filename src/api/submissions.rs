use axum::{
    body::{Body, Bytes},
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::uploads::read_image_upload;
use crate::core::state::AppState;
use crate::models::submission::Submission;
use crate::schemas::batch::RunOptions;
use crate::schemas::submission::SubmissionResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_submission).get(list_submissions))
        .route("/:submission_id", get(get_submission).delete(delete_submission))
        .route("/:submission_id/image", get(get_submission_image))
        .route("/:submission_id/regrade", post(regrade_submission))
}

fn to_response(state: &AppState, submission: &Submission) -> SubmissionResponse {
    SubmissionResponse::from_submission(submission, &state.settings().api().api_v1_str)
}

async fn create_submission(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    let upload = read_image_upload(multipart, state.settings().storage()).await?;
    let submission = state.grader().add_submission(upload.image, upload.name).await?;
    Ok((StatusCode::CREATED, Json(to_response(&state, &submission))))
}

async fn list_submissions(State(state): State<AppState>) -> Json<Vec<SubmissionResponse>> {
    let submissions = state.grader().list_submissions().await;
    Json(submissions.iter().map(|submission| to_response(&state, submission)).collect())
}

async fn get_submission(
    Path(submission_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let submission = state.grader().get_submission(submission_id).await?;
    Ok(Json(to_response(&state, &submission)))
}

async fn delete_submission(
    Path(submission_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.grader().remove_submission(submission_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Streams the stored upload. Serves as the preview handle of a submission.
async fn get_submission_image(
    Path(submission_id): Path<Uuid>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let submission = state.grader().get_submission(submission_id).await?;
    let image = submission.source_image();
    let etag = format!("\"{}\"", image.sha256());

    let cached = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == etag);
    if cached {
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let content_type = HeaderValue::from_str(image.mime_type())
        .map_err(|e| ApiError::internal(e, "Stored image has an invalid media type"))?;
    let etag = HeaderValue::from_str(&etag)
        .map_err(|e| ApiError::internal(e, "Failed to build image ETag"))?;

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::ETAG, etag),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=3600")),
        ],
        Body::from(Bytes::copy_from_slice(image.data())),
    )
        .into_response())
}

async fn regrade_submission(
    Path(submission_id): Path<Uuid>,
    State(state): State<AppState>,
    Query(options): Query<RunOptions>,
) -> Result<(StatusCode, Json<SubmissionResponse>), ApiError> {
    if options.wait {
        let submission = state.grader().regrade(submission_id).await?;
        return Ok((StatusCode::OK, Json(to_response(&state, &submission))));
    }

    let submission = state.grader().start_regrade(submission_id).await?;
    Ok((StatusCode::ACCEPTED, Json(to_response(&state, &submission))))
}

#[cfg(test)]
mod tests;
