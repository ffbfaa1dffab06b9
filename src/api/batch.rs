use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::batch::{
    BatchCancelResponse, BatchStartedResponse, BatchStatusResponse, RunOptions,
};
use crate::services::statistics::BatchAggregate;
use crate::tasks::grading::BatchError;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/batch", post(start_batch).get(batch_status))
        .route("/batch/cancel", post(cancel_batch))
        .route("/stats", get(stats))
}

async fn start_batch(
    State(state): State<AppState>,
    Query(options): Query<RunOptions>,
) -> Result<Response, ApiError> {
    if options.wait {
        let report = state.grader().run_batch().await?;
        if report.selected == 0 {
            return Err(BatchError::NothingToGrade.into());
        }
        return Ok(Json(report).into_response());
    }

    let selected = state.grader().start_batch().await?;
    let body = BatchStartedResponse { message: "Grading batch started".to_string(), selected };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

async fn batch_status(State(state): State<AppState>) -> Json<BatchStatusResponse> {
    let grader = state.grader();
    Json(BatchStatusResponse {
        in_progress: grader.is_running(),
        last_report: grader.last_report().await,
        aggregate: grader.compute_aggregate().await,
    })
}

async fn cancel_batch(State(state): State<AppState>) -> (StatusCode, Json<BatchCancelResponse>) {
    let cancelled = state.grader().cancel_batch();
    (StatusCode::ACCEPTED, Json(BatchCancelResponse { cancelled }))
}

async fn stats(State(state): State<AppState>) -> Json<BatchAggregate> {
    Json(state.grader().compute_aggregate().await)
}
