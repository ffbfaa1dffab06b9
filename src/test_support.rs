use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::models::grading::{Annotation, GradingResult};
use crate::models::submission::{GradingEvent, SourceImage, Submission};
use crate::models::types::AnnotationKind;
use crate::repositories::submissions::SubmissionStore;
use crate::services::collaborators::{GradingCollaborator, ImageCollaborator};
use crate::services::errors::GradingError;
use crate::services::grader::GraderService;
use crate::services::grading_request::GradingRequest;
use crate::services::visual_aid::{GeneratedImage, ImageRequest, VisualAidRequester};
use crate::tasks::grading::GradingPipeline;

pub(crate) const PNG_BYTES: &[u8] =
    &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, b'I', b'H'];

const MULTIPART_BOUNDARY: &str = "grader-test-boundary";

const GRADER_ENV_KEYS: &[&str] = &[
    "GRADER_HOST",
    "GRADER_PORT",
    "GRADER_ENV",
    "ENVIRONMENT",
    "GRADER_STRICT_CONFIG",
    "PROJECT_NAME",
    "VERSION",
    "API_V1_STR",
    "BACKEND_CORS_ORIGINS",
    "GEMINI_API_KEY",
    "GEMINI_BASE_URL",
    "GRADING_MODEL",
    "IMAGE_MODEL",
    "AI_REQUEST_TIMEOUT",
    "AI_MAX_RETRIES",
    "AI_THINKING_BUDGET",
    "VISUAL_AID_ENABLED",
    "GRADING_CONCURRENCY",
    "GRADING_DEFAULT_CONTEXT",
    "MAX_UPLOAD_SIZE_MB",
    "ALLOWED_IMAGE_EXTENSIONS",
    "MAX_SUBMISSIONS",
    "GRADER_LOG_LEVEL",
    "GRADER_LOG_JSON",
    "PROMETHEUS_ENABLED",
];

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    pub(crate) grader: Arc<ScriptedGrader>,
    pub(crate) images: Arc<ScriptedImages>,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

/// Clears every variable the crate reads, then pins the test environment.
pub(crate) fn set_test_env() {
    for key in GRADER_ENV_KEYS {
        std::env::remove_var(key);
    }
    std::env::set_var("GRADER_ENV", "test");
    std::env::set_var("GRADER_STRICT_CONFIG", "0");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

pub(crate) fn build_state(
    settings: Settings,
    grader: Arc<ScriptedGrader>,
    images: Arc<ScriptedImages>,
) -> AppState {
    let pipeline = GradingPipeline::new(
        SubmissionStore::new(),
        grader,
        VisualAidRequester::new(images),
        settings.grading().concurrency,
        settings.grading().default_context.clone(),
    );
    let service = GraderService::new(pipeline, settings.storage().max_submissions);
    AppState::new(settings, service)
}

pub(crate) async fn setup_test_context(
    grader: ScriptedGrader,
    images: ScriptedImages,
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let grader = Arc::new(grader);
    let images = Arc::new(images);
    let state = build_state(settings, grader.clone(), images.clone());
    let app = api::router::router(state.clone());

    TestContext { state, app, grader, images, _guard: guard }
}

pub(crate) async fn default_test_context() -> TestContext {
    setup_test_context(ScriptedGrader::succeeding(7.0), ScriptedImages::succeeding()).await
}

pub(crate) fn grader_service(
    grader: ScriptedGrader,
    images: ScriptedImages,
    max_submissions: usize,
) -> GraderService {
    let pipeline = GradingPipeline::new(
        SubmissionStore::new(),
        Arc::new(grader),
        VisualAidRequester::new(Arc::new(images)),
        1,
        "Grade this math problem.",
    );
    GraderService::new(pipeline, max_submissions)
}

pub(crate) fn png_image(filename: &str) -> SourceImage {
    SourceImage::new(filename, "image/png", PNG_BYTES.to_vec())
}

pub(crate) fn grading_result(score: f64) -> GradingResult {
    GradingResult {
        score,
        max_score: 10.0,
        transcription: "2x + 3 = 7, x = 2".to_string(),
        feedback: "Correct isolation of x.".to_string(),
        strengths: vec!["Clear steps".to_string()],
        weaknesses: Vec::new(),
        annotations: vec![
            Annotation::point(AnnotationKind::Correct, 0.9, 0.3),
            Annotation {
                kind: AnnotationKind::Warning,
                x: 0.92,
                y: 0.7,
                width: Some(0.05),
                height: Some(0.04),
                note: Some("Units missing".to_string()),
            },
        ],
        concept_description: Some("A balance scale with 2x + 3 on one side".to_string()),
        visual_aid: None,
    }
}

/// Raw model answer shaped like the declared response schema.
pub(crate) fn grading_payload(score: f64) -> String {
    json!({
        "score": score,
        "maxScore": 10,
        "studentTranscription": "2x + 3 = 7",
        "feedback": "Check the last step.",
        "strengths": ["Neat layout"],
        "weaknesses": [],
        "conceptDescription": "A number line from 0 to 5",
        "annotations": [
            {"type": "correct", "x": 0.9, "y": 0.2},
            {"type": "error", "x": 0.95, "y": 0.6, "width": 0.04, "height": 0.05, "text": "Sign"}
        ]
    })
    .to_string()
}

pub(crate) fn idle_submission(name: &str) -> Submission {
    Submission::new(name, png_image("work.png"))
}

pub(crate) fn completed_submission(name: &str, score: f64) -> Submission {
    let mut submission = idle_submission(name);
    submission.apply(GradingEvent::GradeRequested).expect("grade requested");
    submission.apply(GradingEvent::Succeeded(grading_result(score))).expect("succeeded");
    submission
}

pub(crate) fn failed_submission(name: &str, message: &str) -> Submission {
    let mut submission = idle_submission(name);
    submission.apply(GradingEvent::GradeRequested).expect("grade requested");
    submission.apply(GradingEvent::Failed(message.to_string())).expect("failed");
    submission
}

/// Grading collaborator that replays a script and records how it was called.
pub(crate) struct ScriptedGrader {
    script: StdMutex<VecDeque<Result<Option<String>, GradingError>>>,
    fallback_score: Option<f64>,
    delay: Duration,
    gate: Option<Semaphore>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: StdMutex<Vec<GradingRequest>>,
}

impl ScriptedGrader {
    fn with_script(
        script: Vec<Result<Option<String>, GradingError>>,
        fallback_score: Option<f64>,
    ) -> Self {
        Self {
            script: StdMutex::new(script.into()),
            fallback_score,
            delay: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: StdMutex::new(Vec::new()),
        }
    }

    /// Answers every call with a valid payload carrying `score`.
    pub(crate) fn succeeding(score: f64) -> Self {
        Self::with_script(Vec::new(), Some(score))
    }

    /// Answers calls in order; fails once the script runs out.
    pub(crate) fn scripted(script: Vec<Result<Option<String>, GradingError>>) -> Self {
        Self::with_script(script, None)
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call blocks until [`Self::release`] hands out a permit.
    pub(crate) fn held(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub(crate) fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<GradingRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl GradingCollaborator for ScriptedGrader {
    async fn grade(&self, request: &GradingRequest) -> Result<Option<String>, GradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(depth, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push(request.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().expect("script lock").pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match (next, self.fallback_score) {
            (Some(answer), _) => answer,
            (None, Some(score)) => Ok(Some(grading_payload(score))),
            (None, None) => {
                Err(GradingError::CollaboratorUnavailable("script exhausted".to_string()))
            }
        }
    }
}

/// Image collaborator returning one fixed answer.
pub(crate) struct ScriptedImages {
    answer: Result<Option<GeneratedImage>, GradingError>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: StdMutex<Vec<ImageRequest>>,
}

impl ScriptedImages {
    fn answering(answer: Result<Option<GeneratedImage>, GradingError>) -> Self {
        Self {
            answer,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: StdMutex::new(Vec::new()),
        }
    }

    pub(crate) fn succeeding() -> Self {
        Self::answering(Ok(Some(GeneratedImage {
            mime_type: "image/jpeg".to_string(),
            base64_data: "QUJD".to_string(),
        })))
    }

    pub(crate) fn failing(err: GradingError) -> Self {
        Self::answering(Err(err))
    }

    pub(crate) fn empty() -> Self {
        Self::answering(Ok(None))
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<ImageRequest> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl ImageCollaborator for ScriptedImages {
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<Option<GeneratedImage>, GradingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let depth = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(depth, Ordering::SeqCst);
        self.prompts.lock().expect("prompts lock").push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

/// Multipart form with a `file` part and an optional `name` part.
pub(crate) fn multipart_request(
    method: Method,
    uri: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
    name: Option<&str>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(name) = name {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n\
                 {name}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"))
        .body(Body::from(body))
        .expect("request body")
}

pub(crate) fn png_upload(uri: &str, name: Option<&str>) -> Request<Body> {
    multipart_request(Method::POST, uri, "work.png", "image/png", PNG_BYTES, name)
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
