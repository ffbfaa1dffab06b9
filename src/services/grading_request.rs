use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::models::submission::SourceImage;
use crate::services::errors::GradingError;

pub(crate) const GRADING_TEMPERATURE: f64 = 0.1;
pub(crate) const DEFAULT_CONTEXT: &str = "Grade this math problem.";

const GRADING_PROMPT: &str = r#"You are an expert mathematics olympiad grader. Grade the student's handwritten work precisely and fairly.

Steps:
1. Transcribe: read the handwriting carefully and transcribe it into LaTeX/plain text in "studentTranscription" so the numbers you graded can be verified.
2. Solve independently: work the problem yourself step by step to establish the correct solution.
3. Grade holistically: compare the full chain of reasoning with your solution, not only the final answer.
   - Was the right method or formula used?
   - Is the logic sound despite an arithmetic slip? Award partial credit for that.
   - Is the notation correct?
   Score out of 10 and report it in "score" with "maxScore" set to 10.
4. Visual concept: in "conceptDescription" write one short description of a diagram that illustrates the core concept of the problem (for example "A right triangle with sides 3, 4 and 5").
5. Annotate: return normalized coordinates in [0, 1] relative to the image for each marker.
   - Place every marker at the END of the line it refers to, in the right margin (x > 0.85), so that it never covers the student's writing.
   - "correct": a major step done correctly.
   - "error": a logic or calculation error.
   - "warning": missing units, bad notation or skipped steps.
   - "info": a neutral remark.
   Only include "width" and "height" together, when a bounding box is needed."#;

const ANSWER_KEY_PROMPT: &str =
    "The second image is the ANSWER KEY. Treat it as the definitive ground truth.";

/// Instructor-supplied grading context shared by every submission in a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub(crate) struct GradingContext {
    #[serde(default)]
    #[validate(length(max = 200))]
    pub(crate) batch_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub(crate) grade_level: Option<String>,
    #[serde(default)]
    #[validate(length(max = 200))]
    pub(crate) focus_area: Option<String>,
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub(crate) custom_rubric: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub(crate) instructions: Option<String>,
}

impl GradingContext {
    /// Renders the context block, falling back to `default_instructions` when
    /// no explicit instructions were given.
    pub(crate) fn render(&self, default_instructions: &str) -> String {
        let mut lines = vec![non_blank(self.instructions.as_deref())
            .unwrap_or(default_instructions)
            .to_string()];

        let labelled = [
            ("Batch", self.batch_name.as_deref()),
            ("Subject", self.subject.as_deref()),
            ("Grade level", self.grade_level.as_deref()),
            ("Focus area", self.focus_area.as_deref()),
        ];
        for (label, value) in labelled {
            if let Some(value) = non_blank(value) {
                lines.push(format!("{label}: {value}"));
            }
        }

        if let Some(rubric) = non_blank(self.custom_rubric.as_deref()) {
            lines.push(format!("Rubric:\n{rubric}"));
        }

        lines.join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct InlineImage {
    pub(crate) mime_type: String,
    pub(crate) base64_data: String,
}

/// Everything the grading model needs for one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct GradingRequest {
    pub(crate) images: Vec<InlineImage>,
    pub(crate) instructions: String,
    pub(crate) response_schema: Value,
    pub(crate) temperature: f64,
}

#[cfg(test)]
impl GradingRequest {
    pub(crate) fn has_answer_key(&self) -> bool {
        self.images.len() > 1
    }
}

pub(crate) fn build_grading_request(
    student: &SourceImage,
    answer_key: Option<&SourceImage>,
    context: &str,
) -> Result<GradingRequest, GradingError> {
    let mut images = vec![encode_image(student)?];
    let mut instructions = format!("{GRADING_PROMPT}\n\nContext/Instructions: {context}");

    if let Some(answer_key) = answer_key {
        images.push(encode_image(answer_key)?);
        instructions.push_str("\n\n");
        instructions.push_str(ANSWER_KEY_PROMPT);
    }

    Ok(GradingRequest {
        images,
        instructions,
        response_schema: grading_response_schema(),
        temperature: GRADING_TEMPERATURE,
    })
}

fn encode_image(image: &SourceImage) -> Result<InlineImage, GradingError> {
    if image.data().is_empty() {
        return Err(GradingError::encoding(image.filename(), "image has no data"));
    }

    let mime_type = image.mime_type().trim().to_ascii_lowercase();
    if !mime_type.starts_with("image/") || mime_type.len() == "image/".len() {
        return Err(GradingError::encoding(
            image.filename(),
            format!("unsupported media type '{}'", image.mime_type()),
        ));
    }

    Ok(InlineImage { mime_type, base64_data: STANDARD.encode(image.data()) })
}

/// Structured-output schema sent with every grading request.
pub(crate) fn grading_response_schema() -> Value {
    let annotation = json!({
        "type": "OBJECT",
        "properties": {
            "type": {"type": "STRING", "enum": ["correct", "error", "warning", "info"]},
            "x": {
                "type": "NUMBER",
                "description": "X coordinate (0-1). Should be > 0.85 (right margin) so the marker never covers handwriting."
            },
            "y": {"type": "NUMBER", "description": "Y coordinate (0-1) relative to image height"},
            "width": {"type": "NUMBER", "description": "Optional bounding box width (0-1)"},
            "height": {"type": "NUMBER", "description": "Optional bounding box height (0-1)"},
            "text": {"type": "STRING", "description": "Short comment shown for the marker"}
        },
        "required": ["type", "x", "y"]
    });

    json!({
        "type": "OBJECT",
        "properties": {
            "score": {"type": "NUMBER", "description": "Score awarded to the student"},
            "maxScore": {"type": "NUMBER", "description": "Maximum possible score (usually 10)"},
            "studentTranscription": {
                "type": "STRING",
                "description": "Transcription of the student's work, used to verify OCR accuracy"
            },
            "feedback": {
                "type": "STRING",
                "description": "Feedback paragraph explaining the flow of the student's reasoning"
            },
            "strengths": {"type": "ARRAY", "items": {"type": "STRING"}},
            "weaknesses": {"type": "ARRAY", "items": {"type": "STRING"}},
            "conceptDescription": {
                "type": "STRING",
                "description": "Short visual description of a diagram explaining the correct solution"
            },
            "annotations": {
                "type": "ARRAY",
                "items": annotation,
                "description": "Markers to place on the submission image"
            }
        },
        "required": ["score", "maxScore", "feedback", "annotations", "studentTranscription"]
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
