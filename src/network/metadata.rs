use serde::{Deserialize, Serialize};

/// Spatial input a network was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    pub fn rgb(height: usize, width: usize) -> Self {
        InputShape { height, width, channels: 3 }
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }
}

/// Annotations stored alongside a network's weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Artifact name, e.g. `stage1`.
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub input_shape: InputShape,
    /// Human-readable class labels for the output layer.
    #[serde(default)]
    pub output_labels: Option<Vec<String>>,
}
