use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{LayerError, ModelError};
use crate::layers::{ChannelAttention, Conv2d, Dense, Flatten, GlobalAvgPool, Layer, MaxPool2d, Padding, Shape};
use crate::network::metadata::{InputShape, ModelMetadata};
use crate::network::network::Network;

fn default_stride() -> usize {
    1
}

/// Describes one layer of a network specification, without weights.
///
/// Input sizes are not stored: they follow from the previous layer's output
/// shape when the spec is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d {
        name: String,
        filters: usize,
        kernel: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: Padding,
        activation: ActivationFunction,
    },
    MaxPool2d { name: String, size: usize },
    ChannelAttention { name: String },
    GlobalAvgPool { name: String },
    Flatten { name: String },
    Dense { name: String, size: usize, activation: ActivationFunction },
}

/// A serializable network architecture.
///
/// `NetworkSpec` can be saved to / loaded from JSON independently of any
/// weights; `build` turns it into a randomly initialized `Network`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used as the model file stem.
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub input_shape: InputShape,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub output_labels: Option<Vec<String>>,
}

fn conv(name: &str, filters: usize, stride: usize, activation: ActivationFunction) -> LayerSpec {
    LayerSpec::Conv2d {
        name: name.into(),
        filters,
        kernel: 3,
        stride,
        padding: Padding::Same,
        activation,
    }
}

impl NetworkSpec {
    /// Small binary screening architecture: one sigmoid output.
    pub fn screening() -> NetworkSpec {
        NetworkSpec {
            name: "stage1".into(),
            version: Some("demo".into()),
            input_shape: InputShape::rgb(224, 224),
            layers: vec![
                conv("stem_conv", 8, 2, ActivationFunction::ReLU),
                LayerSpec::MaxPool2d { name: "stem_pool".into(), size: 2 },
                conv("top_conv", 16, 2, ActivationFunction::Swish),
                LayerSpec::GlobalAvgPool { name: "avg_pool".into() },
                LayerSpec::Dense { name: "predictions".into(), size: 1, activation: ActivationFunction::Sigmoid },
            ],
            output_labels: None,
        }
    }

    /// Subtype architecture with a channel attention block after the
    /// designated `top_conv` layer and a softmax over `labels`.
    pub fn subtype(labels: &[String]) -> NetworkSpec {
        NetworkSpec {
            name: "stage2".into(),
            version: Some("demo".into()),
            input_shape: InputShape::rgb(300, 300),
            layers: vec![
                conv("stem_conv", 8, 2, ActivationFunction::ReLU),
                LayerSpec::MaxPool2d { name: "stem_pool".into(), size: 2 },
                conv("block_conv", 16, 2, ActivationFunction::Swish),
                conv("top_conv", 32, 1, ActivationFunction::Swish),
                LayerSpec::ChannelAttention { name: "attention".into() },
                LayerSpec::GlobalAvgPool { name: "avg_pool".into() },
                LayerSpec::Dense {
                    name: "predictions".into(),
                    size: labels.len(),
                    activation: ActivationFunction::Softmax,
                },
            ],
            output_labels: Some(labels.to_vec()),
        }
    }

    /// Builds a network with He / Xavier initialized weights drawn from `rng`.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Network, ModelError> {
        let mut shape = Shape::spatial(self.input_shape.as_tuple());
        let mut layers = Vec::with_capacity(self.layers.len());
        for spec in &self.layers {
            let layer = match (spec, shape) {
                (LayerSpec::Conv2d { name, filters, kernel, stride, padding, activation }, Shape::Spatial { channels, .. }) => {
                    Layer::Conv2d(Conv2d::he(name, channels, *filters, *kernel, *stride, *padding, *activation, rng))
                }
                (LayerSpec::MaxPool2d { name, size }, _) => Layer::MaxPool2d(MaxPool2d::new(name, *size)),
                (LayerSpec::ChannelAttention { name }, Shape::Spatial { channels, .. }) => {
                    Layer::ChannelAttention(ChannelAttention::xavier(name, channels, rng))
                }
                (LayerSpec::GlobalAvgPool { name }, _) => Layer::GlobalAvgPool(GlobalAvgPool { name: name.clone() }),
                (LayerSpec::Flatten { name }, _) => Layer::Flatten(Flatten { name: name.clone() }),
                (LayerSpec::Dense { name, size, activation }, Shape::Flat(input_size)) => {
                    Layer::Dense(Dense::new(name, input_size, *size, *activation, rng))
                }
                (LayerSpec::Dense { name, .. }, _) => {
                    return Err(LayerError::new(name, format!("expects a flat input, got {}", shape)).into());
                }
                (LayerSpec::Conv2d { name, .. }, _) | (LayerSpec::ChannelAttention { name }, _) => {
                    return Err(LayerError::new(name, format!("expects a spatial input, got {}", shape)).into());
                }
            };
            shape = layer.output_shape(shape)?;
            layers.push(layer);
        }

        let metadata = ModelMetadata {
            name: self.name.clone(),
            version: self.version.clone(),
            description: None,
            input_shape: self.input_shape,
            output_labels: self.output_labels.clone(),
        };
        Network::new(metadata, layers)
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Deserializes a `NetworkSpec` from a JSON file.
    pub fn load_json(path: &str) -> std::io::Result<NetworkSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn labels() -> Vec<String> {
        ["glioma", "meningioma", "pituitary"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn presets_build_with_a_spatial_top_conv() {
        let mut rng = StdRng::seed_from_u64(7);
        for spec in [NetworkSpec::screening(), NetworkSpec::subtype(&labels())] {
            let net = spec.build(&mut rng).unwrap();
            let top = net.layer_index("top_conv").unwrap();
            let shapes = net.layer_shapes().unwrap();
            assert!(matches!(shapes[top], Shape::Spatial { .. }));
        }
    }

    #[test]
    fn subtype_preset_shapes() {
        let net = NetworkSpec::subtype(&labels()).build(&mut StdRng::seed_from_u64(1)).unwrap();
        let shapes = net.layer_shapes().unwrap();
        assert_eq!(shapes[3], Shape::Spatial { height: 38, width: 38, channels: 32 });
        assert_eq!(*shapes.last().unwrap(), Shape::Flat(3));
    }

    #[test]
    fn same_seed_builds_the_same_network() {
        let a = NetworkSpec::screening().build(&mut StdRng::seed_from_u64(3)).unwrap();
        let b = NetworkSpec::screening().build(&mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dense_before_pooling_is_rejected() {
        let spec = NetworkSpec {
            name: "bad".into(),
            version: None,
            input_shape: InputShape::rgb(4, 4),
            layers: vec![LayerSpec::Dense { name: "fc".into(), size: 2, activation: ActivationFunction::Softmax }],
            output_labels: None,
        };
        assert!(spec.build(&mut StdRng::seed_from_u64(0)).is_err());
    }
}
