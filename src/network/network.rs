use std::collections::HashSet;
use std::path::Path;

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{LayerError, ModelError};
use crate::layers::{Features, Layer, Shape};
use crate::math::tensor::Tensor3;
use crate::network::metadata::ModelMetadata;

/// A sequential convolutional classifier.
///
/// Immutable once built: the forward and backward passes take `&self` and
/// keep every intermediate value in the call's own `ForwardTrace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub metadata: ModelMetadata,
    layers: Vec<Layer>,
}

/// Every layer output of one forward pass, kept for the backward pass.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    input: Features,
    outputs: Vec<Features>,
}

impl ForwardTrace {
    pub fn input(&self) -> &Features {
        &self.input
    }

    /// Output of layer `index`.
    pub fn output(&self, index: usize) -> Option<&Features> {
        self.outputs.get(index)
    }

    /// Final network output.
    pub fn scores(&self) -> &[f64] {
        self.outputs.last().and_then(Features::as_flat).unwrap_or(&[])
    }
}

impl Network {
    /// Builds and validates a network.
    pub fn new(metadata: ModelMetadata, layers: Vec<Layer>) -> Result<Network, ModelError> {
        let network = Network { metadata, layers };
        network.validate()?;
        Ok(network)
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn input_shape(&self) -> (usize, usize, usize) {
        self.metadata.input_shape.as_tuple()
    }

    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name() == name)
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.name().to_owned()).collect()
    }

    /// Output shape of every layer, in order.
    pub fn layer_shapes(&self) -> Result<Vec<Shape>, LayerError> {
        let mut shape = Shape::spatial(self.input_shape());
        let mut shapes = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            shape = layer.output_shape(shape)?;
            shapes.push(shape);
        }
        Ok(shapes)
    }

    fn unavailable(&self, reason: impl Into<String>) -> ModelError {
        ModelError::Unavailable { name: self.metadata.name.clone(), reason: reason.into() }
    }

    /// Checks names, parameter sizes and the shape chain from input to a
    /// flat score vector.
    pub fn validate(&self) -> Result<(), ModelError> {
        let (h, w, c) = self.input_shape();
        if h == 0 || w == 0 || c == 0 {
            return Err(self.unavailable("input shape must be non-zero"));
        }
        if self.layers.is_empty() {
            return Err(self.unavailable("network has no layers"));
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            if layer.name().is_empty() {
                return Err(self.unavailable(format!("a {} layer has an empty name", layer.kind())));
            }
            if !seen.insert(layer.name()) {
                return Err(self.unavailable(format!("layer name '{}' is used twice", layer.name())));
            }
        }

        let shapes = self.layer_shapes().map_err(|e| self.unavailable(e.to_string()))?;
        let classes = match shapes.last() {
            Some(Shape::Flat(n)) => *n,
            Some(other) => return Err(self.unavailable(format!("output must be flat, got {}", other))),
            None => 0,
        };
        if let Some(labels) = &self.metadata.output_labels {
            if labels.len() != classes {
                return Err(self.unavailable(format!(
                    "{} output labels for {} outputs",
                    labels.len(),
                    classes
                )));
            }
        }
        Ok(())
    }

    fn check_input(&self, input: &Tensor3) -> Result<(), ModelError> {
        if input.shape() != self.input_shape() {
            return Err(ModelError::InputShape {
                name: self.metadata.name.clone(),
                expected: self.input_shape(),
                actual: input.shape(),
            });
        }
        Ok(())
    }

    pub fn forward(&self, input: &Tensor3) -> Result<Vec<f64>, ModelError> {
        self.check_input(input)?;
        match self.forward_from(0, Features::Spatial(input.clone()))? {
            Features::Flat(scores) => Ok(scores),
            Features::Spatial(t) => Err(self.unavailable(format!("output must be flat, got {:?}", t.shape()))),
        }
    }

    /// Runs layers `start..` on `features`.
    pub fn forward_from(&self, start: usize, features: Features) -> Result<Features, ModelError> {
        let mut current = features;
        for layer in self.layers.iter().skip(start) {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    /// Forward pass keeping every layer's output.
    pub fn trace(&self, input: &Tensor3) -> Result<ForwardTrace, ModelError> {
        self.check_input(input)?;
        let input = Features::Spatial(input.clone());
        let mut outputs: Vec<Features> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let next = layer.forward(outputs.last().unwrap_or(&input))?;
            outputs.push(next);
        }
        Ok(ForwardTrace { input, outputs })
    }

    /// Propagates `seed` (∂S/∂output for some scalar S) back to the output
    /// of layer `index`, returning ∂S/∂(output of `index`).
    pub fn gradient_at(&self, trace: &ForwardTrace, index: usize, seed: &[f64]) -> Result<Features, ModelError> {
        if index >= self.layers.len() || trace.outputs.len() != self.layers.len() {
            return Err(self.unavailable(format!("no layer at index {}", index)));
        }
        let mut grad = Features::Flat(seed.to_vec());
        for i in (index + 1..self.layers.len()).rev() {
            grad = self.layers[i].backward(&trace.outputs[i - 1], &grad)?;
            debug!(layer = self.layers[i].name(), shape = %grad.shape(), "backward step");
        }
        Ok(grad)
    }

    /// Serializes the network to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Loads and validates a network written by `save_json`. Missing,
    /// unreadable, malformed and inconsistent files are all reported as
    /// `ModelError::Unavailable`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Network, ModelError> {
        let path = path.as_ref();
        let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("model").to_owned();
        let file = std::fs::File::open(path).map_err(|e| ModelError::Unavailable {
            name: name.clone(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let reader = std::io::BufReader::new(file);
        let network: Network = serde_json::from_reader(reader).map_err(|e| ModelError::Unavailable {
            name,
            reason: format!("{}: {}", path.display(), e),
        })?;
        network.validate()?;
        Ok(network)
    }

    pub fn from_json_str(json: &str) -> Result<Network, ModelError> {
        let network: Network = serde_json::from_str(json).map_err(|e| ModelError::Unavailable {
            name: "model".into(),
            reason: e.to_string(),
        })?;
        network.validate()?;
        Ok(network)
    }
}
