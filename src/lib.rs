pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod model;
pub mod preprocess;
pub mod saliency;
pub mod compositor;
pub mod pipeline;
pub mod report;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use math::tensor::Tensor3;
pub use activation::activation::ActivationFunction;
pub use layers::{Features, Layer, Shape};
pub use network::{InputShape, ModelMetadata, Network, NetworkSpec};
pub use model::{LayerGradient, LazyModel, ModelArtifact, TargetClass};
pub use preprocess::{InputSize, InputTensor, Normalization, PreprocessProfile, Preprocessor, RawImage};
pub use saliency::{GradCam, SaliencyMap};
pub use compositor::{Compositor, OverlayImage};
pub use pipeline::{Explanation, Finding, InferenceResult, InferenceSummary, Pipeline, PipelineConfig};
pub use report::ReportPayload;
pub use error::{ConfigError, InputError, ModelError, PipelineError, ReportError, SaliencyError, Stage};
