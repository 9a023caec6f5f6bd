//! The layer family a `Network` is built from.
//!
//! Every layer is a pure function of its input: `forward` computes the
//! output, `backward` maps the gradient with respect to the output onto the
//! gradient with respect to the input, recomputing whatever intermediate
//! values it needs. Nothing is cached on the layer, so a loaded network can
//! be shared across threads.

pub mod attention;
pub mod conv;
pub mod dense;
pub mod pool;

use serde::{Deserialize, Serialize};

use crate::error::LayerError;
use crate::math::tensor::Tensor3;

pub use attention::ChannelAttention;
pub use conv::{Conv2d, Padding};
pub use dense::Dense;
pub use pool::{Flatten, GlobalAvgPool, MaxPool2d};

/// Shape of the value flowing between two layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    Spatial { height: usize, width: usize, channels: usize },
    Flat(usize),
}

impl Shape {
    pub fn spatial((height, width, channels): (usize, usize, usize)) -> Shape {
        Shape::Spatial { height, width, channels }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Spatial { height, width, channels } => write!(f, "{}x{}x{}", height, width, channels),
            Shape::Flat(n) => write!(f, "{}", n),
        }
    }
}

/// A value flowing between layers (or its gradient).
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    Spatial(Tensor3),
    Flat(Vec<f64>),
}

impl Features {
    pub fn shape(&self) -> Shape {
        match self {
            Features::Spatial(t) => Shape::spatial(t.shape()),
            Features::Flat(v) => Shape::Flat(v.len()),
        }
    }

    pub fn as_spatial(&self) -> Option<&Tensor3> {
        match self {
            Features::Spatial(t) => Some(t),
            Features::Flat(_) => None,
        }
    }

    pub fn as_flat(&self) -> Option<&[f64]> {
        match self {
            Features::Flat(v) => Some(v),
            Features::Spatial(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Conv2d(Conv2d),
    MaxPool2d(MaxPool2d),
    ChannelAttention(ChannelAttention),
    GlobalAvgPool(GlobalAvgPool),
    Flatten(Flatten),
    Dense(Dense),
}

fn spatial_input<'a>(layer: &str, input: &'a Features) -> Result<&'a Tensor3, LayerError> {
    input
        .as_spatial()
        .ok_or_else(|| LayerError::new(layer, format!("expects a spatial input, got {}", input.shape())))
}

fn flat_input<'a>(layer: &str, input: &'a Features) -> Result<&'a [f64], LayerError> {
    input
        .as_flat()
        .ok_or_else(|| LayerError::new(layer, format!("expects a flat input, got {}", input.shape())))
}

fn expect_shape(layer: &str, value: &Features, expected: Shape, what: &str) -> Result<(), LayerError> {
    if value.shape() != expected {
        return Err(LayerError::new(
            layer,
            format!("{} has shape {}, expected {}", what, value.shape(), expected),
        ));
    }
    Ok(())
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Conv2d(l) => &l.name,
            Layer::MaxPool2d(l) => &l.name,
            Layer::ChannelAttention(l) => &l.name,
            Layer::GlobalAvgPool(l) => &l.name,
            Layer::Flatten(l) => &l.name,
            Layer::Dense(l) => &l.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Layer::Conv2d(_) => "conv2d",
            Layer::MaxPool2d(_) => "max_pool2d",
            Layer::ChannelAttention(_) => "channel_attention",
            Layer::GlobalAvgPool(_) => "global_avg_pool",
            Layer::Flatten(_) => "flatten",
            Layer::Dense(_) => "dense",
        }
    }

    /// Shape inference; also checks that the layer's parameters are
    /// consistent with the input it will receive.
    pub fn output_shape(&self, input: Shape) -> Result<Shape, LayerError> {
        let name = self.name();
        match (self, input) {
            (Layer::Conv2d(l), Shape::Spatial { height, width, channels }) => {
                l.output_shape(height, width, channels)
            }
            (Layer::MaxPool2d(l), Shape::Spatial { height, width, channels }) => {
                l.output_shape(height, width, channels)
            }
            (Layer::ChannelAttention(l), Shape::Spatial { channels, .. }) => {
                l.check(channels)?;
                Ok(input)
            }
            (Layer::GlobalAvgPool(_), Shape::Spatial { channels, .. }) => Ok(Shape::Flat(channels)),
            (Layer::Flatten(_), Shape::Spatial { height, width, channels }) => {
                Ok(Shape::Flat(height * width * channels))
            }
            (Layer::Dense(l), Shape::Flat(n)) => l.output_shape(n),
            (Layer::Dense(_), _) => Err(LayerError::new(name, format!("expects a flat input, got {}", input))),
            (_, _) => Err(LayerError::new(name, format!("expects a spatial input, got {}", input))),
        }
    }

    pub fn forward(&self, input: &Features) -> Result<Features, LayerError> {
        let name = self.name();
        match self {
            Layer::Conv2d(l) => Ok(Features::Spatial(l.forward(spatial_input(name, input)?))),
            Layer::MaxPool2d(l) => Ok(Features::Spatial(l.forward(spatial_input(name, input)?))),
            Layer::ChannelAttention(l) => Ok(Features::Spatial(l.forward(spatial_input(name, input)?))),
            Layer::GlobalAvgPool(l) => Ok(Features::Flat(l.forward(spatial_input(name, input)?))),
            Layer::Flatten(l) => Ok(Features::Flat(l.forward(spatial_input(name, input)?))),
            Layer::Dense(l) => Ok(Features::Flat(l.forward(flat_input(name, input)?))),
        }
    }

    /// Maps ∂L/∂output onto ∂L/∂input for the given `input`.
    pub fn backward(&self, input: &Features, grad_output: &Features) -> Result<Features, LayerError> {
        let name = self.name();
        let expected = self.output_shape(input.shape())?;
        expect_shape(name, grad_output, expected, "output gradient")?;
        match self {
            Layer::Conv2d(l) => {
                let grad = spatial_input(name, grad_output)?;
                Ok(Features::Spatial(l.backward(spatial_input(name, input)?, grad)))
            }
            Layer::MaxPool2d(l) => {
                let grad = spatial_input(name, grad_output)?;
                Ok(Features::Spatial(l.backward(spatial_input(name, input)?, grad)))
            }
            Layer::ChannelAttention(l) => {
                let grad = spatial_input(name, grad_output)?;
                Ok(Features::Spatial(l.backward(spatial_input(name, input)?, grad)))
            }
            Layer::GlobalAvgPool(l) => {
                let grad = flat_input(name, grad_output)?;
                Ok(Features::Spatial(l.backward(spatial_input(name, input)?, grad)))
            }
            Layer::Flatten(l) => {
                let grad = flat_input(name, grad_output)?;
                l.backward(spatial_input(name, input)?, grad).map(Features::Spatial)
            }
            Layer::Dense(l) => {
                let grad = flat_input(name, grad_output)?;
                Ok(Features::Flat(l.backward(flat_input(name, input)?, grad)))
            }
        }
    }
}
