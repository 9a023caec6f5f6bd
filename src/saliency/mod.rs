//! Grad-CAM: class-discriminative localization from a designated
//! convolutional layer.

use tracing::{debug, warn};

use crate::error::SaliencyError;
use crate::math::tensor::Tensor3;
use crate::model::{ModelArtifact, TargetClass};
use crate::preprocess::InputTensor;

/// Single-channel map over the designated layer's grid, values in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    height: usize,
    width: usize,
    values: Vec<f64>,
    class_index: usize,
    localized: bool,
}

impl SaliencyMap {
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, y: usize, x: usize) -> f64 {
        self.values[y * self.width + x]
    }

    /// Class the map explains.
    pub fn class_index(&self) -> usize {
        self.class_index
    }

    /// False when no location contributed positively; the map is then all
    /// zeros.
    pub fn has_evidence(&self) -> bool {
        self.localized
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradCam {
    layer: String,
}

impl GradCam {
    pub fn new(layer: &str) -> GradCam {
        GradCam { layer: layer.to_owned() }
    }

    pub fn layer(&self) -> &str {
        &self.layer
    }

    pub fn explain(
        &self,
        model: &dyn ModelArtifact,
        input: &InputTensor,
        target: TargetClass,
    ) -> Result<SaliencyMap, SaliencyError> {
        let grad = model.layer_gradient(input, &self.layer, target)?;
        let map = GradCam::attribute(&grad.activations, &grad.gradients, grad.class_index).map_err(|e| match e {
            SaliencyError::ShapeMismatch { reason, .. } => SaliencyError::ShapeMismatch { layer: self.layer.clone(), reason },
            other => other,
        })?;
        if map.has_evidence() {
            debug!(layer = %self.layer, class = map.class_index, grid = ?(map.height, map.width), "saliency map");
        } else {
            warn!(layer = %self.layer, class = map.class_index, "saliency map has no localized evidence");
        }
        Ok(map)
    }

    /// Channel weights are the spatial mean of the gradient; the map is the
    /// weighted channel sum, rectified and divided by its maximum.
    ///
    /// Errors carry an empty layer name; `explain` fills it in.
    pub fn attribute(activations: &Tensor3, gradients: &Tensor3, class_index: usize) -> Result<SaliencyMap, SaliencyError> {
        let (height, width, channels) = activations.shape();
        if height == 0 || width == 0 || channels == 0 {
            return Err(SaliencyError::ShapeMismatch {
                layer: String::new(),
                reason: format!("empty feature map {:?}", activations.shape()),
            });
        }
        if activations.shape() != gradients.shape() {
            return Err(SaliencyError::ShapeMismatch {
                layer: String::new(),
                reason: format!("activations {:?} vs gradients {:?}", activations.shape(), gradients.shape()),
            });
        }
        if !activations.is_finite() {
            return Err(SaliencyError::NonFinite("layer activations"));
        }
        if !gradients.is_finite() {
            return Err(SaliencyError::NonFinite("gradients"));
        }

        let weights = gradients.channel_means();
        let mut values: Vec<f64> = activations
            .data()
            .chunks_exact(channels)
            .map(|pixel| pixel.iter().zip(&weights).map(|(a, w)| a * w).sum::<f64>().max(0.0))
            .collect();

        let max = values.iter().cloned().fold(0.0_f64, f64::max);
        if !max.is_finite() {
            return Err(SaliencyError::NonFinite("saliency map"));
        }
        let localized = max > 0.0;
        if localized {
            values.iter_mut().for_each(|v| *v /= max);
        } else {
            values.iter_mut().for_each(|v| *v = 0.0);
        }
        Ok(SaliencyMap { height, width, values, class_index, localized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// 2x2 grid, 2 channels, HWC.
    fn tensor(channel0: [f64; 4], channel1: [f64; 4]) -> Tensor3 {
        let data = (0..4).flat_map(|i| [channel0[i], channel1[i]]).collect();
        Tensor3::from_vec(2, 2, 2, data).unwrap()
    }

    #[test]
    fn attribute_normalises_to_unit_max() {
        let activations = tensor([1.0, 1.0, 1.0, 1.0], [0.5, 1.0, 1.5, 2.0]);
        let gradients = tensor([1.0, 1.0, 1.0, 1.0], [0.0, 0.0, 0.0, 0.4]);
        let map = GradCam::attribute(&activations, &gradients, 0).unwrap();
        // weights [1.0, 0.1]: raw [1.05, 1.1, 1.15, 1.2]
        let expected = [1.05 / 1.2, 1.1 / 1.2, 1.15 / 1.2, 1.0];
        for (v, e) in map.values().iter().zip(expected) {
            assert_abs_diff_eq!(*v, e, epsilon = 1e-12);
        }
        assert!(map.has_evidence());
        assert_eq!((map.height(), map.width()), (2, 2));
    }

    #[test]
    fn negative_evidence_is_rectified() {
        let activations = tensor([1.0, 2.0, 0.0, 0.0], [0.0, 0.0, 1.0, 3.0]);
        let gradients = tensor([-1.0; 4], [1.0; 4]);
        let map = GradCam::attribute(&activations, &gradients, 1).unwrap();
        assert_eq!(map.values(), &[0.0, 0.0, 1.0 / 3.0, 1.0]);
        assert_eq!(map.class_index(), 1);
    }

    #[test]
    fn zero_gradient_gives_empty_map() {
        let activations = tensor([1.0; 4], [2.0; 4]);
        let gradients = tensor([0.0; 4], [0.0; 4]);
        let map = GradCam::attribute(&activations, &gradients, 0).unwrap();
        assert!(!map.has_evidence());
        assert!(map.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn empty_feature_maps_are_rejected() {
        for (h, w, c) in [(4, 4, 0), (0, 4, 2), (4, 0, 2)] {
            let empty = Tensor3::zeros(h, w, c);
            assert!(matches!(
                GradCam::attribute(&empty, &empty, 0),
                Err(SaliencyError::ShapeMismatch { .. })
            ));
        }
    }

    #[test]
    fn non_finite_gradients_are_reported() {
        let activations = tensor([1.0; 4], [2.0; 4]);
        let gradients = tensor([0.0, f64::NAN, 0.0, 0.0], [0.0; 4]);
        assert_eq!(
            GradCam::attribute(&activations, &gradients, 0),
            Err(SaliencyError::NonFinite("gradients"))
        );
    }
}
