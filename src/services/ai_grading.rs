use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use crate::core::config::Settings;
use crate::services::collaborators::{GradingCollaborator, ImageCollaborator};
use crate::services::errors::GradingError;
use crate::services::grading_request::GradingRequest;
use crate::services::visual_aid::{GeneratedImage, ImageRequest};

/// Client for the hosted Gemini API. Serves both the grading model and the
/// image model used for visual aids.
#[derive(Debug, Clone)]
pub(crate) struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    grading_model: String,
    image_model: String,
    thinking_budget: u32,
    max_retries: u32,
    retry_backoff: Duration,
}

impl GeminiClient {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.ai().request_timeout);
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .context("Failed to build Gemini HTTP client")?;

        Ok(Self {
            client,
            api_key: settings.ai().gemini_api_key.clone(),
            base_url: settings.ai().gemini_base_url.trim_end_matches('/').to_string(),
            grading_model: settings.ai().grading_model.clone(),
            image_model: settings.ai().image_model.clone(),
            thinking_budget: settings.ai().thinking_budget,
            max_retries: settings.ai().max_retries,
            retry_backoff: Duration::from_secs(1),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    async fn post_json(&self, url: &str, payload: &Value) -> Result<Value, GradingError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(self.retry_backoff, attempt)).await;
            }

            let response = self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(payload)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return success_body(resp).await;
                    }

                    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
                    let message = format!("Gemini API error ({status}): {}", error_message(&body));
                    if !is_retryable(status) {
                        return Err(GradingError::CollaboratorUnavailable(message));
                    }
                    tracing::warn!(attempt, status = status.as_u16(), "Retryable Gemini API error");
                    last_error = Some(message);
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "Failed to call Gemini API");
                    last_error = Some(format!("Failed to call Gemini API: {err}"));
                }
            }
        }

        Err(GradingError::CollaboratorUnavailable(
            last_error.unwrap_or_else(|| "Gemini API call failed".to_string()),
        ))
    }
}

#[async_trait]
impl GradingCollaborator for GeminiClient {
    async fn grade(&self, request: &GradingRequest) -> Result<Option<String>, GradingError> {
        let timer = Instant::now();
        let payload = grading_payload(request, self.thinking_budget);
        let url = self.model_url(&self.grading_model, "generateContent");

        tracing::info!(
            model = %self.grading_model,
            images = request.images.len(),
            "Sending grading request"
        );

        let body = self.post_json(&url, &payload).await?;

        if let Some(reason) = body.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
            tracing::warn!(block_reason = reason, "Grading request was blocked");
        }

        let text = response_text(&body);
        let tokens_used = body.pointer("/usageMetadata/totalTokenCount").and_then(Value::as_u64);
        tracing::info!(
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used,
            empty = text.is_none(),
            "Grading response received"
        );

        Ok(text)
    }
}

#[async_trait]
impl ImageCollaborator for GeminiClient {
    async fn generate_image(
        &self,
        request: &ImageRequest,
    ) -> Result<Option<GeneratedImage>, GradingError> {
        let payload = json!({
            "instances": [{"prompt": request.prompt}],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": request.aspect_ratio,
                "outputOptions": {"mimeType": request.mime_type}
            }
        });
        let url = self.model_url(&self.image_model, "predict");

        let body = self
            .post_json(&url, &payload)
            .await
            .map_err(|err| GradingError::VisualAid(err.to_string()))?;

        Ok(first_generated_image(&body, request.mime_type))
    }
}

fn grading_payload(request: &GradingRequest, thinking_budget: u32) -> Value {
    let mut parts: Vec<Value> = request
        .images
        .iter()
        .map(|image| {
            json!({"inlineData": {"mimeType": image.mime_type, "data": image.base64_data}})
        })
        .collect();
    parts.push(json!({"text": request.instructions}));

    let mut generation_config = json!({
        "responseMimeType": "application/json",
        "responseSchema": request.response_schema,
        "temperature": request.temperature,
    });
    if thinking_budget > 0 {
        generation_config["thinkingConfig"] = json!({"thinkingBudget": thinking_budget});
    }

    json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": generation_config,
    })
}

/// Concatenated text of the first candidate, ignoring thought parts.
fn response_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn first_generated_image(body: &Value, default_mime_type: &str) -> Option<GeneratedImage> {
    body.get("predictions")?.as_array()?.iter().find_map(|prediction| {
        let data = prediction.get("bytesBase64Encoded").and_then(Value::as_str)?;
        let mime_type =
            prediction.get("mimeType").and_then(Value::as_str).unwrap_or(default_mime_type);
        Some(GeneratedImage { mime_type: mime_type.to_string(), base64_data: data.to_string() })
    })
}

/// A 2xx reply must carry JSON; anything else is a malformed answer.
async fn success_body(resp: reqwest::Response) -> Result<Value, GradingError> {
    let text = resp.text().await.map_err(|err| {
        GradingError::CollaboratorUnavailable(format!("Failed to read Gemini API response: {err}"))
    })?;
    decode_success_body(&text)
}

fn decode_success_body(text: &str) -> Result<Value, GradingError> {
    serde_json::from_str(text).map_err(|err| {
        GradingError::MalformedResponse(format!("Gemini API returned a non-JSON body: {err}"))
    })
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
}

fn error_message(body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
