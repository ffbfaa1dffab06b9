use std::sync::Arc;

use anyhow::Context;

use crate::core::config::Settings;
use crate::repositories::submissions::SubmissionStore;
use crate::services::ai_grading::GeminiClient;
use crate::services::grader::GraderService;
use crate::services::visual_aid::VisualAidRequester;
use crate::tasks::grading::GradingPipeline;

/// Wires the Gemini client, the in-memory store and the pipeline together.
pub(crate) fn build_grader(settings: &Settings) -> anyhow::Result<GraderService> {
    let gemini =
        Arc::new(GeminiClient::from_settings(settings).context("Failed to build Gemini client")?);

    if settings.ai().gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not configured; grading requests will be rejected");
    }

    let visual_aid = if settings.ai().visual_aid_enabled {
        VisualAidRequester::new(gemini.clone())
    } else {
        tracing::info!("Visual aid generation disabled");
        VisualAidRequester::disabled()
    };

    let pipeline = GradingPipeline::new(
        SubmissionStore::new(),
        gemini,
        visual_aid,
        settings.grading().concurrency,
        settings.grading().default_context.clone(),
    );

    tracing::info!(
        grading_model = %settings.ai().grading_model,
        image_model = %settings.ai().image_model,
        concurrency = settings.grading().concurrency,
        "Grader ready"
    );

    Ok(GraderService::new(pipeline, settings.storage().max_submissions))
}
