//! Hand-off to report generators. Rendering the document itself is left to
//! the consumer.

use serde::Serialize;

use crate::error::ReportError;
use crate::pipeline::InferenceResult;
use crate::preprocess::RawImage;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPayload {
    pub label: String,
    /// Confidence as a percentage, two decimals.
    pub confidence_percent: f64,
    pub tumor_detected: bool,
    #[serde(skip)]
    pub original_png: Vec<u8>,
    /// Present for a tumor finding with a rendered explanation.
    #[serde(skip)]
    pub overlay_png: Option<Vec<u8>>,
}

impl ReportPayload {
    pub fn new(image: &RawImage, result: &InferenceResult) -> Result<ReportPayload, ReportError> {
        let overlay_png = match result.overlay() {
            Some(overlay) => Some(overlay.to_png()?),
            None => None,
        };
        Ok(ReportPayload {
            label: result.label().to_owned(),
            confidence_percent: (result.confidence() * 10_000.0).round() / 100.0,
            tumor_detected: result.tumor_detected(),
            original_png: image.to_png()?,
            overlay_png,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use crate::math::tensor::Tensor3;
    use crate::pipeline::{aggregate_negative, aggregate_positive, Classification, Explanation, Screening};
    use crate::saliency::GradCam;

    #[test]
    fn negative_report_has_no_overlay() {
        let image = RawImage::uniform(4, 4, [128, 128, 128]).unwrap();
        let result = aggregate_negative(Screening { probability: 0.1234, threshold: 0.5 });
        let payload = ReportPayload::new(&image, &result).unwrap();
        assert_eq!(payload.label, "No Tumor");
        assert_eq!(payload.confidence_percent, 87.66);
        assert!(payload.overlay_png.is_none());
        assert_eq!(RawImage::from_bytes(&payload.original_png).unwrap(), image);
    }

    #[test]
    fn positive_report_carries_the_overlay() {
        let image = RawImage::from_raw(6, 5, 3, (0..90).map(|v| (v * 3) as u8).collect()).unwrap();
        let activations = Tensor3::from_vec(2, 2, 1, vec![0.0, 1.0, 2.0, 4.0]).unwrap();
        let gradients = Tensor3::from_vec(2, 2, 1, vec![1.0; 4]).unwrap();
        let saliency = GradCam::attribute(&activations, &gradients, 0).unwrap();
        let overlay = Compositor::new(0.4).unwrap().compose(&image, &saliency);
        let classification = Classification {
            class_index: 0,
            label: "glioma".into(),
            confidence: 0.71234,
            probabilities: vec![0.71234, 0.2, 0.08766],
        };
        let result = aggregate_positive(
            Screening { probability: 0.9, threshold: 0.5 },
            classification,
            Explanation::Overlay { overlay, saliency },
        );

        let payload = ReportPayload::new(&image, &result).unwrap();
        assert!(payload.tumor_detected);
        assert_eq!(payload.label, "glioma");
        assert_eq!(payload.confidence_percent, 71.23);
        let overlay = RawImage::from_bytes(payload.overlay_png.as_deref().unwrap()).unwrap();
        assert_eq!(overlay.dimensions(), image.dimensions());
    }
}
