use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum GradingStatus {
    Idle,
    Processing,
    Completed,
    Error,
}

impl GradingStatus {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            GradingStatus::Idle => "idle",
            GradingStatus::Processing => "processing",
            GradingStatus::Completed => "completed",
            GradingStatus::Error => "error",
        }
    }

    /// Eligible for the next batch run.
    pub(crate) fn is_batch_eligible(self) -> bool {
        matches!(self, GradingStatus::Idle | GradingStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum AnnotationKind {
    Correct,
    Error,
    Warning,
    Info,
}

#[cfg(test)]
impl AnnotationKind {
    const ALL: [AnnotationKind; 4] = [
        AnnotationKind::Correct,
        AnnotationKind::Error,
        AnnotationKind::Warning,
        AnnotationKind::Info,
    ];

    fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Correct => "correct",
            AnnotationKind::Error => "error",
            AnnotationKind::Warning => "warning",
            AnnotationKind::Info => "info",
        }
    }
}
