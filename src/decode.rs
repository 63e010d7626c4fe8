//! Image decoding

use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Image data is empty")]
    Empty,

    #[error("Malformed image data: {0}")]
    Malformed(String),

    #[error("Decoding aborted: {0}")]
    Aborted(String),
}

/// A fully decoded image, ready to hand to the consumer.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
}

impl DecodedImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

impl From<DynamicImage> for DecodedImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

/// Turns raw bytes into a [`DecodedImage`].
///
/// Decoding is CPU-bound; the worker calls it from a blocking task.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError>;
}

impl<F> ImageDecoder for F
where
    F: Fn(&[u8]) -> Result<DecodedImage, DecodeError> + Send + Sync,
{
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        self(bytes)
    }
}

/// Decoder backed by the `image` crate's format sniffing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let image =
            image::load_from_memory(bytes).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        Ok(DecodedImage::new(image))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let decoded = ImageCrateDecoder.decode(&png_bytes(4, 3)).unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
    }

    #[test]
    fn test_decode_empty() {
        assert!(matches!(ImageCrateDecoder.decode(&[]), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_garbage() {
        let err = ImageCrateDecoder.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_closure_decoder() {
        let decoder = |bytes: &[u8]| -> Result<DecodedImage, DecodeError> {
            Ok(DecodedImage::new(DynamicImage::new_rgba8(bytes.len() as u32, 1)))
        };
        assert_eq!(decoder.decode(b"abc").unwrap().width(), 3);
    }
}
