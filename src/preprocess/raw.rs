use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageOutputFormat, RgbImage};

use crate::error::{InputError, ReportError};

/// An 8-bit RGB image of any non-zero size, as handed in by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage(RgbImage);

impl RawImage {
    /// Decodes PNG, JPEG, BMP or GIF bytes. Other color types are converted
    /// to RGB.
    pub fn from_bytes(bytes: &[u8]) -> Result<RawImage, InputError> {
        let decoded = image::load_from_memory(bytes).map_err(|e| InputError::Decode(e.to_string()))?;
        RawImage::from_rgb(decoded.to_rgb8())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<RawImage, InputError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| InputError::Decode(format!("{}: {}", path.display(), e)))?;
        RawImage::from_bytes(&bytes)
    }

    pub fn from_rgb(image: RgbImage) -> Result<RawImage, InputError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(InputError::EmptyImage { width, height });
        }
        Ok(RawImage(image))
    }

    /// Interleaved row-major pixel buffer with `channels` bytes per pixel.
    pub fn from_raw(width: u32, height: u32, channels: usize, bytes: Vec<u8>) -> Result<RawImage, InputError> {
        if width == 0 || height == 0 {
            return Err(InputError::EmptyImage { width, height });
        }
        if channels != 3 {
            return Err(InputError::UnsupportedChannels(channels));
        }
        let expected = width as usize * height as usize * 3;
        if bytes.len() != expected {
            return Err(InputError::BufferLength { expected, actual: bytes.len() });
        }
        RgbImage::from_raw(width, height, bytes)
            .ok_or(InputError::BufferLength { expected, actual: 0 })
            .and_then(RawImage::from_rgb)
    }

    /// Every pixel set to `rgb`.
    pub fn uniform(width: u32, height: u32, rgb: [u8; 3]) -> Result<RawImage, InputError> {
        RawImage::from_rgb(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

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

    pub fn to_png(&self) -> Result<Vec<u8>, ReportError> {
        encode_png(&self.0, "original image")
    }
}

pub(crate) fn encode_png(image: &RgbImage, what: &'static str) -> Result<Vec<u8>, ReportError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .map_err(|e| ReportError::Encode { what, reason: e.to_string() })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_images() {
        assert_eq!(
            RawImage::from_raw(0, 4, 3, vec![]),
            Err(InputError::EmptyImage { width: 0, height: 4 })
        );
        assert!(matches!(RawImage::uniform(3, 0, [0, 0, 0]), Err(InputError::EmptyImage { .. })));
    }

    #[test]
    fn rejects_wrong_channel_count() {
        assert_eq!(
            RawImage::from_raw(2, 2, 4, vec![0; 16]),
            Err(InputError::UnsupportedChannels(4))
        );
        assert_eq!(RawImage::from_raw(2, 2, 1, vec![0; 4]), Err(InputError::UnsupportedChannels(1)));
    }

    #[test]
    fn rejects_short_buffers() {
        assert_eq!(
            RawImage::from_raw(2, 2, 3, vec![0; 11]),
            Err(InputError::BufferLength { expected: 12, actual: 11 })
        );
    }

    #[test]
    fn png_bytes_decode_back() {
        let image = RawImage::uniform(5, 3, [10, 20, 30]).unwrap();
        let decoded = RawImage::from_bytes(&image.to_png().unwrap()).unwrap();
        assert_eq!(decoded, image);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(RawImage::from_bytes(b"not an image"), Err(InputError::Decode(_))));
    }
}
