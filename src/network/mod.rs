pub mod metadata;
pub mod network;
pub mod spec;

pub use metadata::{InputShape, ModelMetadata};
pub use network::{ForwardTrace, Network};
pub use spec::{LayerSpec, NetworkSpec};
