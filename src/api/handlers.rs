use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let api = state.settings().api();
    Json(RootResponse {
        message: api.project_name.clone(),
        version: api.version.clone(),
        api_prefix: api.api_v1_str.clone(),
    })
}

/// Everything lives in process memory, so the only degraded states are a
/// missing model key and a running batch.
pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    if state.settings().ai().gemini_api_key.is_empty() {
        components.insert("grading_model".to_string(), "unconfigured".to_string());
        status = "degraded".to_string();
    } else {
        components.insert("grading_model".to_string(), state.settings().ai().grading_model.clone());
    }

    let visual_aid = if state.settings().ai().visual_aid_enabled { "enabled" } else { "disabled" };
    components.insert("visual_aid".to_string(), visual_aid.to_string());

    let pipeline = if state.grader().is_running() { "grading" } else { "idle" };
    components.insert("pipeline".to_string(), pipeline.to_string());

    Json(HealthResponse { service: "visual-grader".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
