use async_trait::async_trait;

use crate::services::errors::GradingError;
use crate::services::grading_request::GradingRequest;
use crate::services::visual_aid::{GeneratedImage, ImageRequest};

/// Multimodal model that grades one submission and answers with raw JSON text.
#[async_trait]
pub(crate) trait GradingCollaborator: Send + Sync {
    /// `Ok(None)` means the service answered without any payload.
    async fn grade(&self, request: &GradingRequest) -> Result<Option<String>, GradingError>;
}

/// Image generation model used for visual aids.
#[async_trait]
pub(crate) trait ImageCollaborator: Send + Sync {
    /// `Ok(None)` means the service produced no image.
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<Option<GeneratedImage>, GradingError>;
}
