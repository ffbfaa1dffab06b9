use serde::{Deserialize, Serialize};

use crate::services::statistics::BatchAggregate;
use crate::tasks::grading::BatchReport;

#[derive(Debug, Serialize)]
pub(crate) struct BatchStatusResponse {
    pub(crate) in_progress: bool,
    pub(crate) last_report: Option<BatchReport>,
    pub(crate) aggregate: BatchAggregate,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchStartedResponse {
    pub(crate) message: String,
    pub(crate) selected: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchCancelResponse {
    pub(crate) cancelled: bool,
}

/// `?wait=true` runs the request to completion instead of in the background.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunOptions {
    #[serde(default)]
    pub(crate) wait: bool,
}
