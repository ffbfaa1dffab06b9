use serde::Deserialize;

use crate::models::grading::{Annotation, GradingResult};
use crate::models::types::AnnotationKind;
use crate::services::errors::GradingError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GradingPayload {
    score: f64,
    max_score: f64,
    student_transcription: String,
    feedback: String,
    #[serde(default)]
    strengths: Option<Vec<String>>,
    #[serde(default)]
    weaknesses: Option<Vec<String>>,
    #[serde(default)]
    concept_description: Option<String>,
    annotations: Vec<AnnotationPayload>,
}

#[derive(Debug, Deserialize)]
struct AnnotationPayload {
    #[serde(rename = "type")]
    kind: AnnotationKind,
    x: f64,
    y: f64,
    #[serde(default)]
    width: Option<f64>,
    #[serde(default)]
    height: Option<f64>,
    #[serde(default)]
    text: Option<String>,
}

impl From<AnnotationPayload> for Annotation {
    fn from(payload: AnnotationPayload) -> Self {
        Annotation {
            kind: payload.kind,
            x: payload.x,
            y: payload.y,
            width: payload.width,
            height: payload.height,
            note: payload.text,
        }
    }
}

/// Decodes the grading model's structured answer.
///
/// Only the shape is checked. Scores above the maximum and coordinates outside
/// the unit square pass through unchanged; see [`Annotation::placement`].
pub(crate) fn parse_grading_result(payload: Option<&str>) -> Result<GradingResult, GradingError> {
    let raw = payload
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or(GradingError::EmptyResponse)?;

    let decoded: GradingPayload = serde_json::from_str(strip_code_fence(raw))
        .map_err(|err| GradingError::MalformedResponse(err.to_string()))?;

    Ok(GradingResult {
        score: decoded.score,
        max_score: decoded.max_score,
        transcription: decoded.student_transcription,
        feedback: decoded.feedback,
        strengths: decoded.strengths.unwrap_or_default(),
        weaknesses: decoded.weaknesses.unwrap_or_default(),
        annotations: decoded.annotations.into_iter().map(Annotation::from).collect(),
        concept_description: decoded
            .concept_description
            .map(|concept| concept.trim().to_string())
            .filter(|concept| !concept.is_empty()),
        visual_aid: None,
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
