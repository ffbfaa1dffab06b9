use uuid::Uuid;

use crate::models::submission::{SourceImage, Submission};
use crate::repositories::submissions::{StoreError, SubmissionStore};
use crate::services::grading_request::GradingContext;
use crate::services::statistics::{compute_aggregate, BatchAggregate};
use crate::tasks::grading::{BatchError, BatchReport, GradingPipeline};

/// Entry point for everything an instructor does during a grading session.
#[derive(Clone)]
pub(crate) struct GraderService {
    pipeline: GradingPipeline,
    max_submissions: usize,
}

impl GraderService {
    pub(crate) fn new(pipeline: GradingPipeline, max_submissions: usize) -> Self {
        Self { pipeline, max_submissions }
    }

    fn store(&self) -> &SubmissionStore {
        self.pipeline.store()
    }

    pub(crate) async fn add_submission(
        &self,
        image: SourceImage,
        display_name: Option<String>,
    ) -> Result<Submission, StoreError> {
        let submission =
            self.store().insert_bounded(display_name, image, self.max_submissions).await?;
        tracing::info!(
            submission_id = %submission.id(),
            display_name = submission.display_name(),
            filename = submission.source_image().filename(),
            size = submission.source_image().size(),
            "Submission added"
        );
        Ok(submission)
    }

    pub(crate) async fn remove_submission(&self, id: Uuid) -> Result<Submission, StoreError> {
        let removed = self.store().remove(id).await.ok_or(StoreError::NotFound(id))?;
        tracing::info!(
            submission_id = %id,
            status = removed.status().as_str(),
            "Submission removed"
        );
        Ok(removed)
    }

    pub(crate) async fn list_submissions(&self) -> Vec<Submission> {
        self.store().list().await
    }

    pub(crate) async fn get_submission(&self, id: Uuid) -> Result<Submission, StoreError> {
        self.store().find(id).await.ok_or(StoreError::NotFound(id))
    }

    pub(crate) async fn answer_key(&self) -> Option<SourceImage> {
        self.store().answer_key().await
    }

    /// Replaces the answer key for the next run. `None` clears it.
    pub(crate) async fn set_answer_key(&self, answer_key: Option<SourceImage>) {
        let filename = answer_key.as_ref().map(|image| image.filename().to_string());
        let previous = self.store().set_answer_key(answer_key).await;
        tracing::info!(
            answer_key = filename.as_deref(),
            replaced = previous.is_some(),
            "Answer key updated"
        );
    }

    pub(crate) async fn context(&self) -> GradingContext {
        self.store().context().await
    }

    pub(crate) async fn set_context(&self, context: GradingContext) {
        self.store().set_context(context).await;
        tracing::info!("Grading context updated");
    }

    pub(crate) async fn run_batch(&self) -> Result<BatchReport, BatchError> {
        self.pipeline.run_batch().await
    }

    pub(crate) async fn start_batch(&self) -> Result<usize, BatchError> {
        self.pipeline.spawn_batch().await
    }

    pub(crate) async fn regrade(&self, id: Uuid) -> Result<Submission, BatchError> {
        self.pipeline.grade_one(id).await
    }

    pub(crate) async fn start_regrade(&self, id: Uuid) -> Result<Submission, BatchError> {
        self.pipeline.start_regrade(id).await
    }

    pub(crate) fn cancel_batch(&self) -> bool {
        self.pipeline.cancel()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.pipeline.is_running()
    }

    pub(crate) async fn wait_until_idle(&self) {
        self.pipeline.wait_until_idle().await;
    }

    pub(crate) async fn last_report(&self) -> Option<BatchReport> {
        self.pipeline.last_report().await
    }

    pub(crate) async fn compute_aggregate(&self) -> BatchAggregate {
        compute_aggregate(&self.store().list().await)
    }
}
