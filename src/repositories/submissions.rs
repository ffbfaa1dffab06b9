use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::submission::{GradingEvent, SourceImage, Submission, TransitionError};
use crate::services::grading_request::GradingContext;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum StoreError {
    #[error("submission {0} not found")]
    NotFound(Uuid),
    #[error("working set already holds the maximum of {limit} submissions")]
    Full { limit: usize },
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Working set of the grading session. Lives only in memory; dropping the
/// store releases every image it holds.
#[derive(Clone, Default)]
pub(crate) struct SubmissionStore {
    inner: Arc<RwLock<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    submissions: Vec<Submission>,
    answer_key: Option<SourceImage>,
    context: GradingContext,
}

impl StoreInner {
    fn push(&mut self, display_name: Option<String>, image: SourceImage) -> Submission {
        let display_name = display_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("Student {}", self.submissions.len() + 1));

        let submission = Submission::new(display_name, image);
        self.submissions.push(submission.clone());
        submission
    }
}

impl SubmissionStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn insert(
        &self,
        display_name: Option<String>,
        image: SourceImage,
    ) -> Submission {
        let mut inner = self.inner.write().await;
        inner.push(display_name, image)
    }

    /// Appends a new idle record unless the store already holds `limit`.
    /// Without a name it is labelled by its position, e.g. "Student 3".
    pub(crate) async fn insert_bounded(
        &self,
        display_name: Option<String>,
        image: SourceImage,
        limit: usize,
    ) -> Result<Submission, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.submissions.len() >= limit {
            return Err(StoreError::Full { limit });
        }
        Ok(inner.push(display_name, image))
    }

    /// Snapshot in intake order.
    pub(crate) async fn list(&self) -> Vec<Submission> {
        self.inner.read().await.submissions.clone()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.inner.read().await.submissions.len()
    }

    pub(crate) async fn find(&self, id: Uuid) -> Option<Submission> {
        self.inner.read().await.submissions.iter().find(|item| item.id() == id).cloned()
    }

    pub(crate) async fn remove(&self, id: Uuid) -> Option<Submission> {
        let mut inner = self.inner.write().await;
        let position = inner.submissions.iter().position(|item| item.id() == id)?;
        Some(inner.submissions.remove(position))
    }

    /// Ids of records the next batch should pick up, in intake order.
    pub(crate) async fn batch_eligible_ids(&self) -> Vec<Uuid> {
        self.inner
            .read()
            .await
            .submissions
            .iter()
            .filter(|item| item.status().is_batch_eligible())
            .map(Submission::id)
            .collect()
    }

    /// Runs one state machine transition and returns the updated record.
    pub(crate) async fn apply(
        &self,
        id: Uuid,
        event: GradingEvent,
    ) -> Result<Submission, StoreError> {
        let mut inner = self.inner.write().await;
        let submission = inner
            .submissions
            .iter_mut()
            .find(|item| item.id() == id)
            .ok_or(StoreError::NotFound(id))?;
        submission.apply(event)?;
        Ok(submission.clone())
    }

    pub(crate) async fn answer_key(&self) -> Option<SourceImage> {
        self.inner.read().await.answer_key.clone()
    }

    /// Replaces the shared answer key and returns the previous one.
    pub(crate) async fn set_answer_key(
        &self,
        answer_key: Option<SourceImage>,
    ) -> Option<SourceImage> {
        std::mem::replace(&mut self.inner.write().await.answer_key, answer_key)
    }

    pub(crate) async fn context(&self) -> GradingContext {
        self.inner.read().await.context.clone()
    }

    pub(crate) async fn set_context(&self, context: GradingContext) {
        self.inner.write().await.context = context;
    }
}
