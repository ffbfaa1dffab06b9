use thiserror::Error;

/// Failures while grading one submission. Everything except `VisualAid` ends
/// up on the submission record; visual aid failures are only logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum GradingError {
    #[error("failed to encode image '{filename}': {reason}")]
    Encoding { filename: String, reason: String },
    #[error("grading service returned an empty response")]
    EmptyResponse,
    #[error("grading response did not match the expected schema: {0}")]
    MalformedResponse(String),
    #[error("grading service unavailable: {0}")]
    CollaboratorUnavailable(String),
    #[error("visual aid generation failed: {0}")]
    VisualAid(String),
}

impl GradingError {
    pub(crate) fn encoding(filename: &str, reason: impl Into<String>) -> Self {
        Self::Encoding { filename: filename.to_string(), reason: reason.into() }
    }

    /// Label used for the `grading_jobs_total` metric.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            GradingError::Encoding { .. } => "encoding",
            GradingError::EmptyResponse => "empty_response",
            GradingError::MalformedResponse(_) => "malformed_response",
            GradingError::CollaboratorUnavailable(_) => "unavailable",
            GradingError::VisualAid(_) => "visual_aid",
        }
    }
}
