use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::models::grading::{GradingResult, VisualAid};
use crate::models::submission::{GradingEvent, SourceImage, Submission};
use crate::models::types::GradingStatus;
use crate::repositories::submissions::{StoreError, SubmissionStore};
use crate::services::collaborators::GradingCollaborator;
use crate::services::errors::GradingError;
use crate::services::grading_request::build_grading_request;
use crate::services::grading_result::parse_grading_result;
use crate::services::visual_aid::{VisualAidOutcome, VisualAidRequester};
use crate::tasks::limiter::CallLimiter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum BatchError {
    #[error("a grading run is already in progress")]
    AlreadyRunning,
    #[error("no submissions are waiting to be graded")]
    NothingToGrade,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct BatchReport {
    pub(crate) batch_id: Uuid,
    pub(crate) selected: usize,
    pub(crate) completed: usize,
    pub(crate) failed: usize,
    pub(crate) skipped: usize,
    pub(crate) cancelled: usize,
    pub(crate) duration_seconds: f64,
}

impl BatchReport {
    fn new(batch_id: Uuid, selected: usize) -> Self {
        Self {
            batch_id,
            selected,
            completed: 0,
            failed: 0,
            skipped: 0,
            cancelled: 0,
            duration_seconds: 0.0,
        }
    }
}

/// Answer key and context captured once per run.
struct GradingInputs {
    answer_key: Option<SourceImage>,
    context: String,
}

enum ItemOutcome {
    Graded { id: Uuid, result: Result<GradingResult, GradingError>, elapsed: Duration },
    Skipped { id: Uuid, reason: StoreError },
    Cancelled { id: Uuid },
}

/// Drives submissions through grading. Only one run (a batch or a single
/// re-grade) is active at a time.
#[derive(Clone)]
pub(crate) struct GradingPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    store: SubmissionStore,
    grader: Arc<dyn GradingCollaborator>,
    visual_aid: VisualAidRequester,
    limiter: CallLimiter,
    concurrency: usize,
    default_context: String,
    cancel_requested: AtomicBool,
    /// Single source of truth for "a run is active".
    progress: watch::Sender<bool>,
    last_report: RwLock<Option<BatchReport>>,
}

/// Held for the lifetime of a run; clears the in-progress flag on drop.
struct RunGuard {
    inner: Arc<PipelineInner>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.progress.send_replace(false);
    }
}

impl GradingPipeline {
    pub(crate) fn new(
        store: SubmissionStore,
        grader: Arc<dyn GradingCollaborator>,
        visual_aid: VisualAidRequester,
        concurrency: usize,
        default_context: impl Into<String>,
    ) -> Self {
        let concurrency = concurrency.max(1);
        let (progress, _) = watch::channel(false);
        Self {
            inner: Arc::new(PipelineInner {
                store,
                grader,
                visual_aid,
                limiter: CallLimiter::new(concurrency),
                concurrency,
                default_context: default_context.into(),
                cancel_requested: AtomicBool::new(false),
                progress,
                last_report: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn store(&self) -> &SubmissionStore {
        &self.inner.store
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.inner.progress.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.progress.subscribe()
    }

    pub(crate) async fn last_report(&self) -> Option<BatchReport> {
        self.inner.last_report.read().await.clone()
    }

    /// Asks the running batch to stop before its next item. Returns false when
    /// nothing is running.
    pub(crate) fn cancel(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.inner.cancel_requested.store(true, Ordering::Release);
        tracing::info!("Cancellation requested for running grading batch");
        true
    }

    pub(crate) async fn wait_until_idle(&self) {
        let mut progress = self.subscribe();
        if progress.wait_for(|running| !*running).await.is_err() {
            tracing::warn!("Grading progress channel closed");
        }
    }

    /// Grades every idle or failed submission, in intake order, and waits for
    /// the run to finish.
    pub(crate) async fn run_batch(&self) -> Result<BatchReport, BatchError> {
        let guard = self.begin()?;
        let ids = self.inner.store.batch_eligible_ids().await;
        Ok(self.execute(guard, ids).await)
    }

    /// Starts a batch in the background. Returns the number of selected
    /// submissions.
    pub(crate) async fn spawn_batch(&self) -> Result<usize, BatchError> {
        let guard = self.begin()?;
        let ids = self.inner.store.batch_eligible_ids().await;
        if ids.is_empty() {
            return Err(BatchError::NothingToGrade);
        }

        let selected = ids.len();
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.execute(guard, ids).await;
        });
        Ok(selected)
    }

    /// Grades a single submission regardless of its previous outcome.
    pub(crate) async fn grade_one(&self, id: Uuid) -> Result<Submission, BatchError> {
        let guard = self.begin()?;
        let claimed = self.inner.store.apply(id, GradingEvent::GradeRequested).await?;
        Ok(self.finish_one(guard, claimed).await?)
    }

    /// Like [`Self::grade_one`] but returns the processing snapshot right away
    /// and grades in the background.
    pub(crate) async fn start_regrade(&self, id: Uuid) -> Result<Submission, BatchError> {
        let guard = self.begin()?;
        let claimed = self.inner.store.apply(id, GradingEvent::GradeRequested).await?;

        let pipeline = self.clone();
        let snapshot = claimed.clone();
        tokio::spawn(async move {
            if let Err(err) = pipeline.finish_one(guard, claimed).await {
                tracing::warn!(submission_id = %id, error = %err, "Re-grade outcome discarded");
            }
        });
        Ok(snapshot)
    }

    fn begin(&self) -> Result<RunGuard, BatchError> {
        let claimed =
            self.inner.progress.send_if_modified(|running| !std::mem::replace(running, true));
        if !claimed {
            return Err(BatchError::AlreadyRunning);
        }
        self.inner.cancel_requested.store(false, Ordering::Release);
        self.inner.progress.send_replace(true);
        Ok(RunGuard { inner: Arc::clone(&self.inner) })
    }

    async fn inputs(&self) -> GradingInputs {
        GradingInputs {
            answer_key: self.inner.store.answer_key().await,
            context: self.inner.store.context().await.render(&self.inner.default_context),
        }
    }

    async fn execute(&self, _guard: RunGuard, ids: Vec<Uuid>) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let timer = Instant::now();
        let inputs = self.inputs().await;
        let mut report = BatchReport::new(batch_id, ids.len());

        tracing::info!(
            %batch_id,
            selected = ids.len(),
            concurrency = self.inner.concurrency,
            answer_key = inputs.answer_key.is_some(),
            "Starting grading batch"
        );

        let mut items = stream::iter(ids)
            .map(|id| self.grade_item(batch_id, id, &inputs))
            .buffered(self.inner.concurrency);

        while let Some(outcome) = items.next().await {
            self.settle(batch_id, outcome, &mut report).await;
        }
        drop(items);

        report.duration_seconds = timer.elapsed().as_secs_f64();
        metrics::counter!("grading_batches_total").increment(1);
        tracing::info!(
            %batch_id,
            selected = report.selected,
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            duration_seconds = report.duration_seconds,
            "Grading batch complete"
        );

        *self.inner.last_report.write().await = Some(report.clone());
        report
    }

    async fn grade_item(&self, batch_id: Uuid, id: Uuid, inputs: &GradingInputs) -> ItemOutcome {
        if self.inner.cancel_requested.load(Ordering::Acquire) {
            return ItemOutcome::Cancelled { id };
        }

        let claimed = match self.inner.store.apply(id, GradingEvent::GradeRequested).await {
            Ok(claimed) => claimed,
            Err(reason) => return ItemOutcome::Skipped { id, reason },
        };
        tracing::info!(
            %batch_id,
            submission_id = %id,
            attempt = claimed.attempts(),
            "Grading submission"
        );

        let timer = Instant::now();
        let result = self.grade_claimed(&claimed, inputs).await;
        ItemOutcome::Graded { id, result, elapsed: timer.elapsed() }
    }

    async fn settle(&self, batch_id: Uuid, outcome: ItemOutcome, report: &mut BatchReport) {
        match outcome {
            ItemOutcome::Cancelled { id } => {
                tracing::debug!(%batch_id, submission_id = %id, "Submission left for a later run");
                report.cancelled += 1;
            }
            ItemOutcome::Skipped { id, reason } => {
                tracing::info!(
                    %batch_id,
                    submission_id = %id,
                    reason = %reason,
                    "Skipping submission"
                );
                report.skipped += 1;
            }
            ItemOutcome::Graded { id, result, elapsed } => {
                match self.record(id, result, elapsed).await {
                    Ok(updated) if updated.status() == GradingStatus::Completed => {
                        report.completed += 1
                    }
                    Ok(_) => report.failed += 1,
                    Err(err) => {
                        tracing::warn!(
                            %batch_id,
                            submission_id = %id,
                            error = %err,
                            "Grading outcome discarded"
                        );
                        report.skipped += 1;
                    }
                }
            }
        }
    }

    async fn finish_one(
        &self,
        _guard: RunGuard,
        claimed: Submission,
    ) -> Result<Submission, StoreError> {
        let inputs = self.inputs().await;
        tracing::info!(
            submission_id = %claimed.id(),
            attempt = claimed.attempts(),
            "Re-grading submission"
        );

        let timer = Instant::now();
        let result = self.grade_claimed(&claimed, &inputs).await;
        self.record(claimed.id(), result, timer.elapsed()).await
    }

    async fn grade_claimed(
        &self,
        submission: &Submission,
        inputs: &GradingInputs,
    ) -> Result<GradingResult, GradingError> {
        let request = build_grading_request(
            submission.source_image(),
            inputs.answer_key.as_ref(),
            &inputs.context,
        )?;

        let payload = {
            let _permit = self.inner.limiter.grading().await?;
            self.inner.grader.grade(&request).await?
        };

        let result = parse_grading_result(payload.as_deref())?;
        let visual_aid = self.visual_aid_for(result.concept_description.as_deref()).await;
        Ok(result.with_visual_aid(visual_aid))
    }

    async fn visual_aid_for(&self, concept: Option<&str>) -> Option<VisualAid> {
        let outcome = match concept {
            Some(_) => match self.inner.limiter.images().await {
                Ok(_permit) => self.inner.visual_aid.request(concept).await,
                Err(err) => VisualAidOutcome::Failed(err.to_string()),
            },
            None => self.inner.visual_aid.request(None).await,
        };
        outcome.into_visual_aid()
    }

    async fn record(
        &self,
        id: Uuid,
        result: Result<GradingResult, GradingError>,
        elapsed: Duration,
    ) -> Result<Submission, StoreError> {
        let duration_seconds = elapsed.as_secs_f64();
        metrics::histogram!("grading_duration_seconds").record(duration_seconds);

        let event = match result {
            Ok(result) => {
                metrics::counter!("grading_jobs_total", "status" => "completed").increment(1);
                tracing::info!(
                    submission_id = %id,
                    score = result.score,
                    max_score = result.max_score,
                    annotations = result.annotations.len(),
                    visual_aid = result.visual_aid.is_some(),
                    duration_seconds,
                    "Submission graded"
                );
                GradingEvent::Succeeded(result)
            }
            Err(err) => {
                metrics::counter!("grading_jobs_total", "status" => err.kind()).increment(1);
                tracing::warn!(
                    submission_id = %id,
                    error = %err,
                    duration_seconds,
                    "Grading failed"
                );
                GradingEvent::Failed(err.to_string())
            }
        };

        self.inner.store.apply(id, event).await
    }
}
