use std::sync::Arc;

use serde::Serialize;

use crate::models::grading::VisualAid;
use crate::services::collaborators::ImageCollaborator;

pub(crate) const VISUAL_AID_ASPECT_RATIO: &str = "1:1";
pub(crate) const VISUAL_AID_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ImageRequest {
    pub(crate) prompt: String,
    pub(crate) aspect_ratio: &'static str,
    pub(crate) mime_type: &'static str,
}

impl ImageRequest {
    pub(crate) fn for_concept(concept: &str) -> Self {
        Self {
            prompt: format!(
                "A clean, educational mathematical diagram or illustration suitable for a \
                 textbook. Concept: {concept}. White background, clear lines, high contrast."
            ),
            aspect_ratio: VISUAL_AID_ASPECT_RATIO,
            mime_type: VISUAL_AID_MIME_TYPE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GeneratedImage {
    pub(crate) mime_type: String,
    pub(crate) base64_data: String,
}

/// What happened to a visual aid request. None of these is an error from the
/// caller's point of view.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VisualAidOutcome {
    Generated(VisualAid),
    Skipped,
    Disabled,
    NoImage,
    Failed(String),
}

impl VisualAidOutcome {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            VisualAidOutcome::Generated(_) => "generated",
            VisualAidOutcome::Skipped => "skipped",
            VisualAidOutcome::Disabled => "disabled",
            VisualAidOutcome::NoImage => "no_image",
            VisualAidOutcome::Failed(_) => "failed",
        }
    }

    pub(crate) fn into_visual_aid(self) -> Option<VisualAid> {
        match self {
            VisualAidOutcome::Generated(visual_aid) => Some(visual_aid),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct VisualAidRequester {
    collaborator: Option<Arc<dyn ImageCollaborator>>,
}

impl VisualAidRequester {
    pub(crate) fn new(collaborator: Arc<dyn ImageCollaborator>) -> Self {
        Self { collaborator: Some(collaborator) }
    }

    pub(crate) fn disabled() -> Self {
        Self { collaborator: None }
    }

    pub(crate) async fn request(&self, concept: Option<&str>) -> VisualAidOutcome {
        let Some(concept) = concept.map(str::trim).filter(|concept| !concept.is_empty()) else {
            return VisualAidOutcome::Skipped;
        };
        let Some(collaborator) = &self.collaborator else {
            return VisualAidOutcome::Disabled;
        };

        let request = ImageRequest::for_concept(concept);
        let outcome = match collaborator.generate_image(&request).await {
            Ok(Some(image)) if !image.base64_data.is_empty() => VisualAidOutcome::Generated(
                VisualAid::from_base64(&image.mime_type, &image.base64_data),
            ),
            Ok(_) => {
                tracing::warn!(concept, "Image model returned no image");
                VisualAidOutcome::NoImage
            }
            Err(err) => {
                tracing::warn!(error = %err, concept, "Visual aid generation failed");
                VisualAidOutcome::Failed(err.to_string())
            }
        };

        metrics::counter!("visual_aid_requests_total", "outcome" => outcome.label()).increment(1);
        outcome
    }
}
