#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ferrite_mri::{
    ActivationFunction, InputShape, InputTensor, LayerGradient, ModelArtifact, ModelError, Network,
    NetworkSpec, SaliencyError, TargetClass, Tensor3,
};
use ferrite_mri::layers::Padding;
use ferrite_mri::network::LayerSpec;
use rand::{rngs::StdRng, SeedableRng};

/// A model that returns fixed scores and counts its calls.
pub struct StubModel {
    name: String,
    input_shape: (usize, usize, usize),
    scores: Vec<f64>,
    empty_layer: bool,
    pub predictions: AtomicUsize,
    pub gradients: AtomicUsize,
}

impl StubModel {
    pub fn new(name: &str, side: usize, scores: &[f64]) -> Arc<StubModel> {
        Arc::new(StubModel {
            name: name.to_owned(),
            input_shape: (side, side, 3),
            scores: scores.to_vec(),
            empty_layer: false,
            predictions: AtomicUsize::new(0),
            gradients: AtomicUsize::new(0),
        })
    }

    /// Like `new`, but `top_conv` reports a 4x4 map with no channels.
    pub fn with_empty_layer(name: &str, side: usize, scores: &[f64]) -> Arc<StubModel> {
        Arc::new(StubModel {
            name: name.to_owned(),
            input_shape: (side, side, 3),
            scores: scores.to_vec(),
            empty_layer: true,
            predictions: AtomicUsize::new(0),
            gradients: AtomicUsize::new(0),
        })
    }

    pub fn predictions(&self) -> usize {
        self.predictions.load(Ordering::SeqCst)
    }

    pub fn gradient_calls(&self) -> usize {
        self.gradients.load(Ordering::SeqCst)
    }
}

impl ModelArtifact for StubModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_shape(&self) -> (usize, usize, usize) {
        self.input_shape
    }

    fn layer_names(&self) -> Vec<String> {
        vec!["top_conv".into(), "predictions".into()]
    }

    fn predict(&self, input: &InputTensor) -> Result<Vec<f64>, ModelError> {
        assert_eq!(input.shape(), self.input_shape);
        self.predictions.fetch_add(1, Ordering::SeqCst);
        Ok(self.scores.clone())
    }

    /// A 4x4 grid with evidence concentrated in the top-left corner.
    fn layer_gradient(
        &self,
        _input: &InputTensor,
        layer: &str,
        target: TargetClass,
    ) -> Result<LayerGradient, SaliencyError> {
        self.gradients.fetch_add(1, Ordering::SeqCst);
        if layer != "top_conv" {
            return Err(SaliencyError::InvalidLayer { layer: layer.to_owned(), available: self.layer_names() });
        }
        let class_index = match target {
            TargetClass::Index(i) => i,
            TargetClass::Predicted => 0,
        };
        if self.empty_layer {
            return Ok(LayerGradient {
                activations: Tensor3::zeros(4, 4, 0),
                gradients: Tensor3::zeros(4, 4, 0),
                scores: self.scores.clone(),
                class_index,
            });
        }
        let activations: Vec<f64> = (0..16).map(|i| if i == 0 { 4.0 } else { 1.0 / (1 + i) as f64 }).collect();
        Ok(LayerGradient {
            activations: Tensor3::from_vec(4, 4, 1, activations).unwrap(),
            gradients: Tensor3::from_vec(4, 4, 1, vec![0.5; 16]).unwrap(),
            scores: self.scores.clone(),
            class_index,
        })
    }
}

/// Small real subtype network over a `side × side` input, `top_conv` at
/// half resolution.
pub fn small_subtype_network(side: usize, seed: u64) -> Network {
    let spec = NetworkSpec {
        name: "stage2".into(),
        version: None,
        input_shape: InputShape::rgb(side, side),
        layers: vec![
            LayerSpec::Conv2d {
                name: "stem_conv".into(),
                filters: 4,
                kernel: 3,
                stride: 1,
                padding: Padding::Same,
                activation: ActivationFunction::Tanh,
            },
            LayerSpec::MaxPool2d { name: "stem_pool".into(), size: 2 },
            LayerSpec::Conv2d {
                name: "top_conv".into(),
                filters: 6,
                kernel: 3,
                stride: 1,
                padding: Padding::Same,
                activation: ActivationFunction::Swish,
            },
            LayerSpec::ChannelAttention { name: "attention".into() },
            LayerSpec::GlobalAvgPool { name: "avg_pool".into() },
            LayerSpec::Dense { name: "predictions".into(), size: 3, activation: ActivationFunction::Softmax },
        ],
        output_labels: Some(vec!["glioma".into(), "meningioma".into(), "pituitary".into()]),
    };
    spec.build(&mut StdRng::seed_from_u64(seed)).unwrap()
}

/// Deterministic non-uniform input tensor.
pub fn pattern_tensor(h: usize, w: usize, c: usize) -> Tensor3 {
    let data = (0..h * w * c).map(|i| ((i * 37 % 101) as f64 / 101.0) - 0.3).collect();
    Tensor3::from_vec(h, w, c, data).unwrap()
}
