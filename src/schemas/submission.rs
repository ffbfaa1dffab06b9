use serde::Serialize;
use uuid::Uuid;

use crate::core::time::format_offset;
use crate::models::grading::{Annotation, GradingResult, MarkerPlacement};
use crate::models::submission::{SourceImage, Submission};
use crate::models::types::GradingStatus;

#[derive(Debug, Serialize)]
pub(crate) struct SubmissionResponse {
    pub(crate) id: Uuid,
    pub(crate) display_name: String,
    pub(crate) status: GradingStatus,
    pub(crate) image: ImageResponse,
    pub(crate) preview_url: String,
    pub(crate) attempts: u32,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) result: Option<GradingResultResponse>,
    pub(crate) error_message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ImageResponse {
    pub(crate) filename: String,
    pub(crate) mime_type: String,
    pub(crate) size: usize,
    pub(crate) sha256: String,
}

/// Grading result plus clamped marker placements ready for overlay.
#[derive(Debug, Serialize)]
pub(crate) struct GradingResultResponse {
    #[serde(flatten)]
    pub(crate) result: GradingResult,
    pub(crate) placements: Vec<MarkerPlacement>,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnswerKeyResponse {
    pub(crate) configured: bool,
    pub(crate) image: Option<ImageResponse>,
}

impl ImageResponse {
    pub(crate) fn from_image(image: &SourceImage) -> Self {
        Self {
            filename: image.filename().to_string(),
            mime_type: image.mime_type().to_string(),
            size: image.size(),
            sha256: image.sha256().to_string(),
        }
    }
}

impl SubmissionResponse {
    /// `api_prefix` is the versioned API root the preview URL hangs off.
    pub(crate) fn from_submission(submission: &Submission, api_prefix: &str) -> Self {
        let result = submission.result().map(|result| GradingResultResponse {
            placements: result.annotations.iter().map(Annotation::placement).collect(),
            result: result.clone(),
        });

        Self {
            id: submission.id(),
            display_name: submission.display_name().to_string(),
            status: submission.status(),
            image: ImageResponse::from_image(submission.source_image()),
            preview_url: format!("{api_prefix}/submissions/{}/image", submission.id()),
            attempts: submission.attempts(),
            created_at: format_offset(submission.created_at()),
            updated_at: format_offset(submission.updated_at()),
            result,
            error_message: submission.error_message().map(str::to_string),
        }
    }
}
