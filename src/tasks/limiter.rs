use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::services::errors::GradingError;

/// Process-wide cap on outstanding collaborator calls. Grading and image
/// calls are limited independently; every path that talks to a model goes
/// through the same limiter.
#[derive(Debug, Clone)]
pub(crate) struct CallLimiter {
    grading: Arc<Semaphore>,
    images: Arc<Semaphore>,
}

impl CallLimiter {
    pub(crate) fn new(cap: usize) -> Self {
        let cap = cap.max(1);
        Self { grading: Arc::new(Semaphore::new(cap)), images: Arc::new(Semaphore::new(cap)) }
    }

    pub(crate) async fn grading(&self) -> Result<SemaphorePermit<'_>, GradingError> {
        self.grading
            .acquire()
            .await
            .map_err(|_| GradingError::CollaboratorUnavailable("grading limiter closed".into()))
    }

    pub(crate) async fn images(&self) -> Result<SemaphorePermit<'_>, GradingError> {
        self.images
            .acquire()
            .await
            .map_err(|_| GradingError::VisualAid("image limiter closed".into()))
    }
}
