//! Saliency map → colorized overlay on the source image.

pub mod colormap;

use image::{imageops, ImageBuffer, Luma, RgbImage};

use crate::error::{ConfigError, ReportError};
use crate::preprocess::raw::encode_png;
use crate::preprocess::{RawImage, RESIZE_FILTER};
use crate::saliency::SaliencyMap;

/// The source image with the heatmap blended in. Always the source's size.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayImage(RgbImage);

impl OverlayImage {
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    pub fn height(&self) -> u32 {
        self.0.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.0
    }

    pub fn into_rgb(self) -> RgbImage {
        self.0
    }

    pub fn to_png(&self) -> Result<Vec<u8>, ReportError> {
        encode_png(&self.0, "overlay")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    blend_weight: f64,
}

impl Compositor {
    /// `blend_weight` is the heatmap's share of each output pixel.
    pub fn new(blend_weight: f64) -> Result<Compositor, ConfigError> {
        if !(0.0..=1.0).contains(&blend_weight) {
            return Err(ConfigError::OutOfUnitRange { field: "blend_weight", value: blend_weight });
        }
        Ok(Compositor { blend_weight })
    }

    pub fn blend_weight(&self) -> f64 {
        self.blend_weight
    }

    /// The map resized to `width × height`, quantized to 256 levels and
    /// colored with the JET ramp.
    pub fn heatmap(&self, map: &SaliencyMap, width: u32, height: u32) -> RgbImage {
        let grid: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_fn(map.width() as u32, map.height() as u32, |x, y| {
                Luma([map.get(y as usize, x as usize) as f32])
            });
        let resized = if grid.dimensions() == (width, height) {
            grid
        } else {
            imageops::resize(&grid, width, height, RESIZE_FILTER)
        };
        RgbImage::from_fn(width, height, |x, y| {
            let v = resized.get_pixel(x, y)[0].clamp(0.0, 1.0);
            colormap::jet_level((v * 255.0) as u8)
        })
    }

    pub fn compose(&self, original: &RawImage, map: &SaliencyMap) -> OverlayImage {
        let source = original.as_rgb();
        if !map.has_evidence() {
            return OverlayImage(source.clone());
        }
        let (width, height) = source.dimensions();
        let heat = self.heatmap(map, width, height);
        let w = self.blend_weight;
        let mut out = source.clone();
        for (o, h) in out.pixels_mut().zip(heat.pixels()) {
            for c in 0..3 {
                let v = (1.0 - w) * o[c] as f64 + w * h[c] as f64;
                o[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        OverlayImage(out)
    }
}
