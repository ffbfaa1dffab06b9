use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::grading::GradingResult;
use crate::models::types::GradingStatus;

/// Raw image as uploaded. Cloning shares the underlying bytes.
#[derive(Debug, Clone)]
pub(crate) struct SourceImage {
    filename: String,
    mime_type: String,
    data: Arc<[u8]>,
    sha256: String,
}

impl SourceImage {
    pub(crate) fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        let data = data.into();
        let sha256 = hex::encode(Sha256::digest(&data));
        Self { filename: filename.into(), mime_type: mime_type.into(), data, sha256 }
    }

    pub(crate) fn filename(&self) -> &str {
        &self.filename
    }

    pub(crate) fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn size(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Lifecycle of a submission. Result and error message live inside the
/// variant they belong to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SubmissionState {
    Idle,
    Processing,
    Completed(Box<GradingResult>),
    Error(String),
}

impl SubmissionState {
    pub(crate) fn status(&self) -> GradingStatus {
        match self {
            SubmissionState::Idle => GradingStatus::Idle,
            SubmissionState::Processing => GradingStatus::Processing,
            SubmissionState::Completed(_) => GradingStatus::Completed,
            SubmissionState::Error(_) => GradingStatus::Error,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum GradingEvent {
    GradeRequested,
    Succeeded(GradingResult),
    Failed(String),
}

impl GradingEvent {
    fn name(&self) -> &'static str {
        match self {
            GradingEvent::GradeRequested => "grade_requested",
            GradingEvent::Succeeded(_) => "succeeded",
            GradingEvent::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum TransitionError {
    #[error("submission is already being graded")]
    AlreadyProcessing,
    #[error("cannot apply {event} to a submission in status {status}")]
    NotProcessing { event: &'static str, status: &'static str },
}

#[derive(Debug, Clone)]
pub(crate) struct Submission {
    id: Uuid,
    display_name: String,
    source_image: SourceImage,
    state: SubmissionState,
    attempts: u32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl Submission {
    pub(crate) fn new(display_name: impl Into<String>, source_image: SourceImage) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            source_image,
            state: SubmissionState::Idle,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn display_name(&self) -> &str {
        &self.display_name
    }

    pub(crate) fn source_image(&self) -> &SourceImage {
        &self.source_image
    }

    pub(crate) fn status(&self) -> GradingStatus {
        self.state.status()
    }

    pub(crate) fn result(&self) -> Option<&GradingResult> {
        match &self.state {
            SubmissionState::Completed(result) => Some(result.as_ref()),
            _ => None,
        }
    }

    pub(crate) fn error_message(&self) -> Option<&str> {
        match &self.state {
            SubmissionState::Error(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub(crate) fn updated_at(&self) -> OffsetDateTime {
        self.updated_at
    }

    /// Single entry point for status changes.
    ///
    /// | from                      | event            | to         |
    /// |---------------------------|------------------|------------|
    /// | idle, error, completed    | `GradeRequested` | processing |
    /// | processing                | `Succeeded`      | completed  |
    /// | processing                | `Failed`         | error      |
    pub(crate) fn apply(&mut self, event: GradingEvent) -> Result<(), TransitionError> {
        let next = match (&self.state, event) {
            (SubmissionState::Processing, GradingEvent::GradeRequested) => {
                return Err(TransitionError::AlreadyProcessing);
            }
            (_, GradingEvent::GradeRequested) => {
                self.attempts += 1;
                SubmissionState::Processing
            }
            (SubmissionState::Processing, GradingEvent::Succeeded(result)) => {
                SubmissionState::Completed(Box::new(result))
            }
            (SubmissionState::Processing, GradingEvent::Failed(message)) => {
                SubmissionState::Error(message)
            }
            (state, event) => {
                return Err(TransitionError::NotProcessing {
                    event: event.name(),
                    status: state.status().as_str(),
                });
            }
        };

        self.state = next;
        self.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}
