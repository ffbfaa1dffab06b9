use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::grader::GraderService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    grader: GraderService,
}

impl AppState {
    pub(crate) fn new(settings: Settings, grader: GraderService) -> Self {
        Self { inner: Arc::new(InnerState { settings, grader }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn grader(&self) -> &GraderService {
        &self.inner.grader
    }
}
