use thiserror::Error;

/// Rejected input images.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("expected 3 color channels, got {0}")]
    UnsupportedChannels(usize),
    #[error("pixel buffer holds {actual} bytes, {expected} expected")]
    BufferLength { expected: usize, actual: usize },
    #[error("could not decode image: {0}")]
    Decode(String),
}

/// Failures of a model artifact: loading, calling contract, score contract.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("model '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },
    #[error("model '{name}' expects input {expected:?}, got {actual:?}")]
    InputShape {
        name: String,
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },
    #[error("model '{name}' produced invalid scores: {reason}")]
    InvalidScores { name: String, reason: String },
    #[error(transparent)]
    Layer(#[from] LayerError),
}

/// A layer that cannot accept the shape or values it was handed.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("layer '{layer}': {reason}")]
pub struct LayerError {
    pub layer: String,
    pub reason: String,
}

impl LayerError {
    pub fn new(layer: &str, reason: impl Into<String>) -> Self {
        LayerError { layer: layer.to_owned(), reason: reason.into() }
    }
}

/// Saliency failures. These never block a classification result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SaliencyError {
    #[error("layer '{layer}' does not exist (available: {})", .available.join(", "))]
    InvalidLayer { layer: String, available: Vec<String> },
    #[error("cannot differentiate with respect to layer '{layer}': {reason}")]
    ShapeMismatch { layer: String, reason: String },
    #[error("target class {index} is out of range for {classes} classes")]
    InvalidTarget { index: usize, classes: usize },
    #[error("non-finite values in {0}")]
    NonFinite(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },
    #[error("{0} input size must be non-zero")]
    EmptyInputSize(&'static str),
    #[error("{0} normalization has a non-positive standard deviation")]
    DegenerateStd(&'static str),
    #[error("subtype stage needs at least two labels, got {0}")]
    TooFewLabels(usize),
    #[error("designated layer name is empty")]
    EmptyLayerName,
    #[error("could not read configuration: {0}")]
    Io(String),
    #[error("could not parse configuration: {0}")]
    Parse(String),
}

/// Pipeline stage boundaries, used to report where a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Screening,
    Subtype,
    Saliency,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Screening => "screening",
            Stage::Subtype => "subtype",
            Stage::Saliency => "saliency",
        }
    }
}

/// Errors that end an inference request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("request stopped after the {} stage", .stage.as_str())]
    Aborted { stage: Stage },
}

/// Failures while preparing the report hand-off.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReportError {
    #[error("could not encode {what} as PNG: {reason}")]
    Encode { what: &'static str, reason: String },
}
