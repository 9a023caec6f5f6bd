//! Raw image → normalized fixed-size model input.

pub mod raw;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::math::tensor::Tensor3;

pub use raw::RawImage;

/// Interpolation used whenever an image or map is resized.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// How 8-bit pixel values become model inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// `x / 255`
    #[default]
    UnitRange,
    /// `(x / 255 - mean[c]) / std[c]`
    MeanStd { mean: [f64; 3], std: [f64; 3] },
}

impl Normalization {
    pub fn apply(&self, channel: usize, value: u8) -> f64 {
        let x = value as f64 / 255.0;
        match self {
            Normalization::UnitRange => x,
            Normalization::MeanStd { mean, std } => (x - mean[channel]) / std[channel],
        }
    }

    /// Smallest and largest value `apply` can return.
    pub fn value_range(&self) -> (f64, f64) {
        match self {
            Normalization::UnitRange => (0.0, 1.0),
            Normalization::MeanStd { .. } => (0..3).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(self.apply(c, 0)), hi.max(self.apply(c, 255)))
            }),
        }
    }

    pub fn validate(&self, stage: &'static str) -> Result<(), ConfigError> {
        if let Normalization::MeanStd { mean, std } = self {
            if std.iter().any(|s| !(s.is_finite() && *s > 0.0)) || mean.iter().any(|m| !m.is_finite()) {
                return Err(ConfigError::DegenerateStd(stage));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSize {
    pub height: u32,
    pub width: u32,
}

impl InputSize {
    pub fn square(side: u32) -> InputSize {
        InputSize { height: side, width: side }
    }
}

/// Everything that defines one stage's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessProfile {
    pub input_size: InputSize,
    #[serde(default)]
    pub normalization: Normalization,
}

impl PreprocessProfile {
    pub fn validate(&self, stage: &'static str) -> Result<(), ConfigError> {
        if self.input_size.height == 0 || self.input_size.width == 0 {
            return Err(ConfigError::EmptyInputSize(stage));
        }
        self.normalization.validate(stage)
    }
}

/// A normalized `height × width × 3` tensor in HWC order.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(Tensor3);

impl InputTensor {
    pub fn from_tensor(tensor: Tensor3) -> InputTensor {
        InputTensor(tensor)
    }

    pub fn tensor(&self) -> &Tensor3 {
        &self.0
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        self.0.shape()
    }

    pub fn into_tensor(self) -> Tensor3 {
        self.0
    }
}

/// Resizes the whole image to the profile's size (no crop, no letterbox)
/// and normalizes every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    profile: PreprocessProfile,
}

impl Preprocessor {
    pub fn new(profile: PreprocessProfile) -> Preprocessor {
        Preprocessor { profile }
    }

    pub fn profile(&self) -> &PreprocessProfile {
        &self.profile
    }

    pub fn value_range(&self) -> (f64, f64) {
        self.profile.normalization.value_range()
    }

    pub fn run(&self, image: &RawImage) -> InputTensor {
        let InputSize { height, width } = self.profile.input_size;
        let source = image.as_rgb();
        let resized;
        let pixels = if source.dimensions() == (width, height) {
            source
        } else {
            resized = imageops::resize(source, width, height, RESIZE_FILTER);
            &resized
        };

        let mut tensor = Tensor3::zeros(height as usize, width as usize, 3);
        for (value, (i, &byte)) in tensor.data_mut().iter_mut().zip(pixels.as_raw().iter().enumerate()) {
            *value = self.profile.normalization.apply(i % 3, byte);
        }
        debug!(
            from = ?image.dimensions(),
            to = ?(width, height),
            "preprocessed image"
        );
        InputTensor(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn profile(side: u32, normalization: Normalization) -> PreprocessProfile {
        PreprocessProfile { input_size: InputSize::square(side), normalization }
    }

    #[test]
    fn output_has_configured_shape_and_unit_range() {
        let image = RawImage::from_raw(7, 3, 3, (0..63).map(|v| (v * 4) as u8).collect()).unwrap();
        let pre = Preprocessor::new(profile(16, Normalization::UnitRange));
        let tensor = pre.run(&image);
        assert_eq!(tensor.shape(), (16, 16, 3));
        assert!(tensor.tensor().data().iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn uniform_gray_stays_uniform() {
        let image = RawImage::uniform(40, 25, [128, 128, 128]).unwrap();
        let tensor = Preprocessor::new(profile(8, Normalization::UnitRange)).run(&image);
        for v in tensor.tensor().data() {
            assert_abs_diff_eq!(*v, 128.0 / 255.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn channel_order_is_rgb() {
        let image = RawImage::uniform(2, 2, [255, 0, 51]).unwrap();
        let tensor = Preprocessor::new(profile(2, Normalization::UnitRange)).run(&image);
        assert_eq!(&tensor.tensor().data()[..3], &[1.0, 0.0, 0.2]);
    }

    #[test]
    fn mean_std_range_covers_outputs() {
        let norm = Normalization::MeanStd { mean: [0.485, 0.456, 0.406], std: [0.229, 0.224, 0.225] };
        let (lo, hi) = norm.value_range();
        let image = RawImage::from_raw(4, 4, 3, (0..48).map(|v| (v * 5) as u8).collect()).unwrap();
        let tensor = Preprocessor::new(profile(6, norm)).run(&image);
        assert!(tensor.tensor().data().iter().all(|v| *v >= lo && *v <= hi));
        assert!(lo < 0.0 && hi > 1.0);
    }

    #[test]
    fn degenerate_std_is_rejected() {
        let norm = Normalization::MeanStd { mean: [0.5; 3], std: [0.2, 0.0, 0.2] };
        assert_eq!(norm.validate("subtype"), Err(ConfigError::DegenerateStd("subtype")));
        assert_eq!(
            profile(0, Normalization::UnitRange).validate("screening"),
            Err(ConfigError::EmptyInputSize("screening"))
        );
    }
}
