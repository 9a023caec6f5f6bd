use serde::{Deserialize, Serialize};

use crate::compositor::OverlayImage;
use crate::error::SaliencyError;
use crate::saliency::SaliencyMap;

/// Label reported when screening is negative.
pub const NO_TUMOR_LABEL: &str = "No Tumor";

/// Stage-1 outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Screening {
    pub probability: f64,
    pub threshold: f64,
}

impl Screening {
    /// A probability equal to the threshold counts as a detection.
    pub fn detected(&self) -> bool {
        self.probability >= self.threshold
    }
}

/// Stage-2 outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class_index: usize,
    pub label: String,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
}

/// Grad-CAM result for a positive finding. A failed explanation keeps its
/// error instead of failing the request.
#[derive(Debug, Clone, PartialEq)]
pub enum Explanation {
    Overlay { overlay: OverlayImage, saliency: SaliencyMap },
    Unavailable(SaliencyError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnosis {
    pub classification: Classification,
    pub explanation: Explanation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    NoTumor,
    Tumor(Diagnosis),
}

/// Aggregated outcome of one image. A subtype and an explanation exist
/// exactly when a tumor was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    screening: Screening,
    finding: Finding,
}

/// Result for a negative screening.
pub fn aggregate_negative(screening: Screening) -> InferenceResult {
    InferenceResult { screening, finding: Finding::NoTumor }
}

/// Result for a positive screening with its subtype and explanation.
pub fn aggregate_positive(screening: Screening, classification: Classification, explanation: Explanation) -> InferenceResult {
    InferenceResult {
        screening,
        finding: Finding::Tumor(Diagnosis { classification, explanation }),
    }
}

impl InferenceResult {
    pub fn screening(&self) -> Screening {
        self.screening
    }

    pub fn screening_probability(&self) -> f64 {
        self.screening.probability
    }

    pub fn finding(&self) -> &Finding {
        &self.finding
    }

    pub fn tumor_detected(&self) -> bool {
        matches!(self.finding, Finding::Tumor(_))
    }

    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match &self.finding {
            Finding::Tumor(d) => Some(d),
            Finding::NoTumor => None,
        }
    }

    pub fn label(&self) -> &str {
        self.diagnosis().map_or(NO_TUMOR_LABEL, |d| d.classification.label.as_str())
    }

    /// Stage-2 confidence for a tumor, `1 - p` for a negative screening.
    pub fn confidence(&self) -> f64 {
        match &self.finding {
            Finding::Tumor(d) => d.classification.confidence,
            Finding::NoTumor => 1.0 - self.screening.probability,
        }
    }

    pub fn overlay(&self) -> Option<&OverlayImage> {
        match self.diagnosis().map(|d| &d.explanation) {
            Some(Explanation::Overlay { overlay, .. }) => Some(overlay),
            _ => None,
        }
    }

    pub fn saliency(&self) -> Option<&SaliencyMap> {
        match self.diagnosis().map(|d| &d.explanation) {
            Some(Explanation::Overlay { saliency, .. }) => Some(saliency),
            _ => None,
        }
    }

    pub fn explanation_error(&self) -> Option<&SaliencyError> {
        match self.diagnosis().map(|d| &d.explanation) {
            Some(Explanation::Unavailable(e)) => Some(e),
            _ => None,
        }
    }

    pub fn summary(&self) -> InferenceSummary {
        let diagnosis = self.diagnosis();
        InferenceSummary {
            tumor_detected: self.tumor_detected(),
            tumor_type: self.label().to_owned(),
            confidence: self.confidence(),
            screening_probability: self.screening.probability,
            class_index: diagnosis.map(|d| d.classification.class_index),
            probabilities: diagnosis.map(|d| d.classification.probabilities.clone()),
            localized_evidence: self.saliency().map(SaliencyMap::has_evidence),
            explanation_error: self.explanation_error().map(|e| e.to_string()),
        }
    }
}

/// JSON view of an `InferenceResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceSummary {
    pub tumor_detected: bool,
    pub tumor_type: String,
    pub confidence: f64,
    pub screening_probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localized_evidence: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn screening(probability: f64) -> Screening {
        Screening { probability, threshold: 0.5 }
    }

    #[test]
    fn threshold_tie_is_a_detection() {
        assert!(screening(0.5).detected());
        assert!(!screening(0.4999).detected());
    }

    #[test]
    fn negative_summary_matches_service_json() {
        let result = aggregate_negative(screening(0.1));
        assert!(!result.tumor_detected());
        assert!(result.overlay().is_none());
        assert_abs_diff_eq!(result.confidence(), 0.9, epsilon = 1e-12);
        let json = serde_json::to_value(result.summary()).unwrap();
        assert_eq!(json["tumorDetected"], false);
        assert_eq!(json["tumorType"], "No Tumor");
        assert!(json.get("classIndex").is_none());
    }

    #[test]
    fn failed_explanation_keeps_the_classification() {
        let classification = Classification {
            class_index: 2,
            label: "pituitary".into(),
            confidence: 0.8,
            probabilities: vec![0.1, 0.1, 0.8],
        };
        let error = SaliencyError::InvalidLayer { layer: "top_conv".into(), available: vec!["conv".into()] };
        let result = aggregate_positive(screening(0.7), classification, Explanation::Unavailable(error.clone()));
        assert!(result.tumor_detected());
        assert_eq!(result.label(), "pituitary");
        assert_eq!(result.explanation_error(), Some(&error));
        let summary = result.summary();
        assert_eq!(summary.class_index, Some(2));
        assert_eq!(summary.localized_evidence, None);
        assert_eq!(summary.explanation_error, Some(error.to_string()));
    }
}
