//! Image decoding and PNG encoding.
//!
//! Layer images travel through the pipeline either as the encoded bytes they
//! arrived in or as decoded RGBA pixels. Keeping the encoded form around lets
//! untouched layers skip a lossy decode/encode round trip.

use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode png: {0}")]
    Encode(#[source] image::ImageError),
}

/// Decodes image bytes of any supported format into RGBA pixels.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, CodecError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(CodecError::Decode)
}

/// Encodes RGBA pixels as PNG, keeping the alpha channel.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, CodecError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(CodecError::Encode)?;
    Ok(bytes)
}

/// A layer image, either still encoded or decoded to pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerImage {
    /// Bytes exactly as received; never re-encoded.
    Encoded(Vec<u8>),
    /// Decoded RGBA pixels.
    Decoded(RgbaImage),
}

impl LayerImage {
    /// Returns the decoded pixels, decoding if needed.
    pub fn to_rgba(&self) -> Result<RgbaImage, CodecError> {
        match self {
            Self::Encoded(bytes) => decode(bytes),
            Self::Decoded(img) => Ok(img.clone()),
        }
    }

    /// Returns the pixel dimensions if the image is decoded.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Self::Encoded(_) => None,
            Self::Decoded(img) => Some(img.dimensions()),
        }
    }

    /// Produces the bytes to package. Encoded images pass through untouched.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Encoded(bytes) => Ok(bytes.clone()),
            Self::Decoded(img) => encode_png(img),
        }
    }

    pub fn is_decoded(&self) -> bool {
        matches!(self, Self::Decoded(_))
    }
}

impl From<RgbaImage> for LayerImage {
    fn from(img: RgbaImage) -> Self {
        Self::Decoded(img)
    }
}

impl From<Vec<u8>> for LayerImage {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Encoded(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_roundtrip_preserves_alpha() {
        let mut img = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255]));
        img.put_pixel(2, 3, Rgba([0, 0, 0, 0]));
        img.put_pixel(4, 4, Rgba([200, 100, 50, 128]));

        let bytes = encode_png(&img).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, img);
    }

    #[test]
    fn decode_garbage_fails() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn encoded_bytes_pass_through_untouched() {
        let bytes = vec![1, 2, 3, 4];
        let layer = LayerImage::from(bytes.clone());
        assert!(!layer.is_decoded());
        assert_eq!(layer.dimensions(), None);
        assert_eq!(layer.to_png_bytes().unwrap(), bytes);
    }

    #[test]
    fn decoded_reports_dimensions() {
        let layer = LayerImage::from(RgbaImage::new(12, 7));
        assert_eq!(layer.dimensions(), Some((12, 7)));
        assert!(layer.is_decoded());
    }
}
