//! The calling contract between the pipeline and a loaded classifier.

pub mod shared;

use crate::error::{ModelError, SaliencyError};
use crate::math::tensor::Tensor3;
use crate::network::Network;
use crate::preprocess::InputTensor;

pub use shared::LazyModel;

/// Which class score a gradient is taken of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetClass {
    /// The highest-scoring class of the forward pass.
    #[default]
    Predicted,
    Index(usize),
}

/// Activations of one layer and the gradient of a class score with respect
/// to them, from a single forward/backward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGradient {
    pub activations: Tensor3,
    pub gradients: Tensor3,
    pub scores: Vec<f64>,
    pub class_index: usize,
}

/// A loaded, read-only classifier.
///
/// Implementations must not mutate themselves during `predict` or
/// `layer_gradient`; one instance serves concurrent requests.
pub trait ModelArtifact: Send + Sync {
    fn name(&self) -> &str;

    /// `(height, width, channels)` the model accepts.
    fn input_shape(&self) -> (usize, usize, usize);

    fn layer_names(&self) -> Vec<String>;

    /// Class scores for one input.
    fn predict(&self, input: &InputTensor) -> Result<Vec<f64>, ModelError>;

    /// Forward pass recording `layer`'s output, then the gradient of the
    /// target class score with respect to that output.
    fn layer_gradient(
        &self,
        input: &InputTensor,
        layer: &str,
        target: TargetClass,
    ) -> Result<LayerGradient, SaliencyError>;
}

/// Index of the largest score; the first one wins ties.
pub fn argmax(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &s) in scores.iter().enumerate() {
        match best {
            Some((_, b)) if s <= b => {}
            _ if s.is_nan() => {}
            _ => best = Some((i, s)),
        }
    }
    best.map(|(i, _)| i)
}

pub(crate) fn resolve_target(target: TargetClass, scores: &[f64]) -> Result<usize, SaliencyError> {
    let classes = scores.len();
    match target {
        TargetClass::Index(index) if index < classes => Ok(index),
        TargetClass::Index(index) => Err(SaliencyError::InvalidTarget { index, classes }),
        TargetClass::Predicted => argmax(scores).ok_or(SaliencyError::NonFinite("class scores")),
    }
}

impl ModelArtifact for Network {
    fn name(&self) -> &str {
        Network::name(self)
    }

    fn input_shape(&self) -> (usize, usize, usize) {
        Network::input_shape(self)
    }

    fn layer_names(&self) -> Vec<String> {
        Network::layer_names(self)
    }

    fn predict(&self, input: &InputTensor) -> Result<Vec<f64>, ModelError> {
        self.forward(input.tensor())
    }

    fn layer_gradient(
        &self,
        input: &InputTensor,
        layer: &str,
        target: TargetClass,
    ) -> Result<LayerGradient, SaliencyError> {
        let index = self.layer_index(layer).ok_or_else(|| SaliencyError::InvalidLayer {
            layer: layer.to_owned(),
            available: self.layer_names(),
        })?;
        let trace = self.trace(input.tensor())?;

        let activations = trace
            .output(index)
            .and_then(|f| f.as_spatial())
            .cloned()
            .ok_or_else(|| SaliencyError::ShapeMismatch {
                layer: layer.to_owned(),
                reason: "output is not a spatial grid".into(),
            })?;
        let scores = trace.scores().to_vec();
        let class_index = resolve_target(target, &scores)?;

        let mut seed = vec![0.0; scores.len()];
        seed[class_index] = 1.0;
        let gradients = self.gradient_at(&trace, index, &seed)?;
        let gradients = match gradients.as_spatial() {
            Some(g) if g.shape() == activations.shape() => g.clone(),
            _ => {
                return Err(SaliencyError::ShapeMismatch {
                    layer: layer.to_owned(),
                    reason: format!("gradient has shape {}", gradients.shape()),
                })
            }
        };

        Ok(LayerGradient { activations, gradients, scores, class_index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_of_equal_scores() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[0.7, 0.2, 0.1]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn argmax_skips_nan() {
        assert_eq!(argmax(&[f64::NAN, 0.1]), Some(1));
        assert_eq!(argmax(&[f64::NAN]), None);
    }

    #[test]
    fn explicit_target_must_be_in_range() {
        assert_eq!(resolve_target(TargetClass::Index(2), &[0.5, 0.5, 0.0]), Ok(2));
        assert_eq!(
            resolve_target(TargetClass::Index(3), &[0.5, 0.5, 0.0]),
            Err(SaliencyError::InvalidTarget { index: 3, classes: 3 })
        );
    }
}
