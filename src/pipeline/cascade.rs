use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::compositor::Compositor;
use crate::error::{ModelError, PipelineError, Stage};
use crate::model::{argmax, LazyModel, ModelArtifact, TargetClass};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::result::{
    aggregate_negative, aggregate_positive, Classification, Explanation, InferenceResult, Screening,
};
use crate::preprocess::{InputTensor, Preprocessor, RawImage};
use crate::saliency::GradCam;

/// Tolerance on the Stage-2 probabilities summing to one.
pub const SUM_TOLERANCE: f64 = 1e-3;

/// Stage-1 must return exactly one finite probability.
pub fn check_screening_scores(model: &str, scores: &[f64]) -> Result<f64, ModelError> {
    let invalid = |reason: String| ModelError::InvalidScores { name: model.to_owned(), reason };
    match scores {
        [p] if p.is_finite() && (0.0..=1.0).contains(p) => Ok(*p),
        [p] => Err(invalid(format!("probability {} is outside [0, 1]", p))),
        _ => Err(invalid(format!("expected 1 score, got {}", scores.len()))),
    }
}

/// Stage-2 must return one probability per label, summing to one.
pub fn check_subtype_scores(model: &str, scores: &[f64], classes: usize) -> Result<(), ModelError> {
    let invalid = |reason: String| ModelError::InvalidScores { name: model.to_owned(), reason };
    if scores.len() != classes {
        return Err(invalid(format!("expected {} scores, got {}", classes, scores.len())));
    }
    if let Some(p) = scores.iter().find(|p| !(p.is_finite() && (0.0..=1.0).contains(*p))) {
        return Err(invalid(format!("probability {} is outside [0, 1]", p)));
    }
    let sum: f64 = scores.iter().sum();
    if (sum - 1.0).abs() > SUM_TOLERANCE {
        return Err(invalid(format!("probabilities sum to {}", sum)));
    }
    Ok(())
}

fn check_stop(stop: Option<&AtomicBool>, stage: Stage) -> Result<(), PipelineError> {
    match stop {
        Some(flag) if flag.load(Ordering::SeqCst) => {
            info!(stage = stage.as_str(), "request stopped");
            Err(PipelineError::Aborted { stage })
        }
        _ => Ok(()),
    }
}

fn check_input_size(model: &dyn ModelArtifact, pre: &Preprocessor) -> Result<(), ModelError> {
    let size = pre.profile().input_size;
    let expected = (size.height as usize, size.width as usize, 3);
    if model.input_shape() != expected {
        return Err(ModelError::InputShape {
            name: model.name().to_owned(),
            expected: model.input_shape(),
            actual: expected,
        });
    }
    Ok(())
}

/// Screening → subtype → explanation over two shared, read-only models.
///
/// A `Pipeline` holds no per-request state; one instance serves any number
/// of concurrent `run` calls.
pub struct Pipeline {
    config: PipelineConfig,
    stage1: Arc<dyn ModelArtifact>,
    stage2: Arc<dyn ModelArtifact>,
    screening_pre: Preprocessor,
    subtype_pre: Preprocessor,
    grad_cam: GradCam,
    compositor: Compositor,
}

impl Pipeline {
    /// Validates `config` and checks both models accept the configured
    /// input sizes.
    pub fn new(
        config: PipelineConfig,
        stage1: Arc<dyn ModelArtifact>,
        stage2: Arc<dyn ModelArtifact>,
    ) -> Result<Pipeline, PipelineError> {
        config.validate()?;
        let screening_pre = Preprocessor::new(config.screening.clone());
        let subtype_pre = Preprocessor::new(config.subtype.profile());
        check_input_size(stage1.as_ref(), &screening_pre)?;
        check_input_size(stage2.as_ref(), &subtype_pre)?;
        let grad_cam = GradCam::new(&config.designated_layer_name);
        let compositor = Compositor::new(config.blend_weight)?;
        info!(
            stage1 = stage1.name(),
            stage2 = stage2.name(),
            layer = %config.designated_layer_name,
            threshold = config.screening_threshold,
            "pipeline ready"
        );
        Ok(Pipeline { config, stage1, stage2, screening_pre, subtype_pre, grad_cam, compositor })
    }

    /// Builds a pipeline from lazily loaded models, loading them if needed.
    pub fn from_lazy(config: PipelineConfig, stage1: &LazyModel, stage2: &LazyModel) -> Result<Pipeline, PipelineError> {
        Pipeline::new(config, stage1.get()?, stage2.get()?)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn screen_tensor(&self, input: &InputTensor) -> Result<Screening, PipelineError> {
        let started = Instant::now();
        let scores = self.stage1.predict(input)?;
        let probability = check_screening_scores(self.stage1.name(), &scores)?;
        let screening = Screening { probability, threshold: self.config.screening_threshold };
        info!(
            probability,
            detected = screening.detected(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "screening"
        );
        Ok(screening)
    }

    fn classify_tensor(&self, input: &InputTensor) -> Result<Classification, PipelineError> {
        let started = Instant::now();
        let labels = &self.config.subtype.labels;
        let probabilities = self.stage2.predict(input)?;
        check_subtype_scores(self.stage2.name(), &probabilities, labels.len())?;
        let class_index = argmax(&probabilities).ok_or_else(|| ModelError::InvalidScores {
            name: self.stage2.name().to_owned(),
            reason: "no scores".into(),
        })?;
        let classification = Classification {
            class_index,
            label: labels[class_index].clone(),
            confidence: probabilities[class_index],
            probabilities,
        };
        info!(
            label = %classification.label,
            confidence = classification.confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "subtype"
        );
        Ok(classification)
    }

    fn explain_tensor(&self, image: &RawImage, input: &InputTensor, class_index: usize) -> Explanation {
        let started = Instant::now();
        match self.grad_cam.explain(self.stage2.as_ref(), input, TargetClass::Index(class_index)) {
            Ok(saliency) => {
                let overlay = self.compositor.compose(image, &saliency);
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "explanation");
                Explanation::Overlay { overlay, saliency }
            }
            Err(e) => {
                warn!(layer = self.grad_cam.layer(), error = %e, "explanation unavailable");
                Explanation::Unavailable(e)
            }
        }
    }

    /// Stage-1 alone.
    pub fn screen(&self, image: &RawImage) -> Result<Screening, PipelineError> {
        self.screen_tensor(&self.screening_pre.run(image))
    }

    /// Stage-2 alone, regardless of screening.
    pub fn classify(&self, image: &RawImage) -> Result<Classification, PipelineError> {
        self.classify_tensor(&self.subtype_pre.run(image))
    }

    /// Grad-CAM overlay for `class_index` of the subtype model.
    pub fn explain(&self, image: &RawImage, class_index: usize) -> Explanation {
        self.explain_tensor(image, &self.subtype_pre.run(image), class_index)
    }

    pub fn run(&self, image: &RawImage) -> Result<InferenceResult, PipelineError> {
        self.run_with_stop(image, None)
    }

    /// Like `run`, checking `stop` after each stage.
    pub fn run_with_stop(&self, image: &RawImage, stop: Option<&AtomicBool>) -> Result<InferenceResult, PipelineError> {
        let started = Instant::now();
        let input = self.screening_pre.run(image);
        check_stop(stop, Stage::Preprocess)?;

        let screening = self.screen_tensor(&input)?;
        check_stop(stop, Stage::Screening)?;
        if !screening.detected() {
            debug!(elapsed_ms = started.elapsed().as_millis() as u64, "request done");
            return Ok(aggregate_negative(screening));
        }

        let input = self.subtype_pre.run(image);
        let classification = self.classify_tensor(&input)?;
        check_stop(stop, Stage::Subtype)?;

        let explanation = self.explain_tensor(image, &input, classification.class_index);
        check_stop(stop, Stage::Saliency)?;

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "request done");
        Ok(aggregate_positive(screening, classification, explanation))
    }
}
