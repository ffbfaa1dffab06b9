use serde::Serialize;

use crate::models::types::AnnotationKind;

/// Threshold past which the annotation tooltip opens towards the left.
const RIGHT_SIDE_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct GradingResult {
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) transcription: String,
    pub(crate) feedback: String,
    pub(crate) strengths: Vec<String>,
    pub(crate) weaknesses: Vec<String>,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) concept_description: Option<String>,
    pub(crate) visual_aid: Option<VisualAid>,
}

impl GradingResult {
    pub(crate) fn with_visual_aid(mut self, visual_aid: Option<VisualAid>) -> Self {
        self.visual_aid = visual_aid;
        self
    }
}

/// Marker on the submission image. Coordinates are normalized to the image
/// size with `(0, 0)` at the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct Annotation {
    pub(crate) kind: AnnotationKind,
    pub(crate) x: f64,
    pub(crate) y: f64,
    pub(crate) width: Option<f64>,
    pub(crate) height: Option<f64>,
    pub(crate) note: Option<String>,
}

impl Annotation {
    #[cfg(test)]
    pub(crate) fn point(kind: AnnotationKind, x: f64, y: f64) -> Self {
        Self { kind, x, y, width: None, height: None, note: None }
    }

    /// The bounding region, only when both extents were supplied.
    pub(crate) fn region(&self) -> Option<(f64, f64)> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some((width, height)),
            _ => None,
        }
    }

    /// Screen placement with every coordinate clamped into `[0, 1]`.
    ///
    /// The grading model is trusted for content, not geometry: values outside
    /// the unit square or a half-specified region are tolerated here instead of
    /// being rejected when the response is decoded.
    pub(crate) fn placement(&self) -> MarkerPlacement {
        let x = unit(self.x);
        let y = unit(self.y);
        let region = self
            .region()
            .map(|(width, height)| (unit(width), unit(height)))
            .filter(|(width, height)| *width > 0.0 && *height > 0.0);

        MarkerPlacement {
            kind: self.kind,
            left_percent: x * 100.0,
            top_percent: y * 100.0,
            region: region.map(|(width, height)| MarkerRegion {
                width_percent: width * 100.0,
                height_percent: height * 100.0,
            }),
            tooltip_on_left: x > RIGHT_SIDE_THRESHOLD,
            note: self.note.clone().filter(|note| !note.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct MarkerPlacement {
    pub(crate) kind: AnnotationKind,
    pub(crate) left_percent: f64,
    pub(crate) top_percent: f64,
    pub(crate) region: Option<MarkerRegion>,
    pub(crate) tooltip_on_left: bool,
    pub(crate) note: Option<String>,
}

/// Region centered on the marker position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct MarkerRegion {
    pub(crate) width_percent: f64,
    pub(crate) height_percent: f64,
}

/// Generated illustration, carried inline as a data URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct VisualAid {
    pub(crate) mime_type: String,
    pub(crate) data_url: String,
}

impl VisualAid {
    pub(crate) fn from_base64(mime_type: &str, base64_data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data_url: format!("data:{mime_type};base64,{base64_data}"),
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
