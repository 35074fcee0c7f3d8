//! Multi-resolution resampling of canonical-size layers.

use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, Rgba32FImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::codec::LayerImage;
use crate::layer::Rendered;

/// Interpolation filter used for resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResampleFilter {
    #[default]
    Lanczos3,
    CatmullRom,
    Gaussian,
    Triangle,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Triangle => FilterType::Triangle,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ResampleError {
    #[error("cannot resize to {0}x{0}")]
    InvalidTarget(u32),

    #[error("resize to {size}x{size} failed: {reason}")]
    Failed { size: u32, reason: String },
}

/// Resizes decoded pixels to a square target size.
///
/// This is the seam for swapping the resizing backend.
pub trait Resample: Send + Sync {
    fn resample(&self, image: &RgbaImage, size: u32) -> Result<RgbaImage, ResampleError>;
}

/// [`Resample`] backed by `image::imageops` filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterResampler {
    filter: ResampleFilter,
}

impl FilterResampler {
    pub fn new(filter: ResampleFilter) -> Self {
        Self { filter }
    }
}

impl Resample for FilterResampler {
    fn resample(&self, image: &RgbaImage, size: u32) -> Result<RgbaImage, ResampleError> {
        if size == 0 {
            return Err(ResampleError::InvalidTarget(size));
        }
        if image.dimensions() == (size, size) {
            return Ok(image.clone());
        }
        let resized = imageops::resize(&premultiply(image), size, size, self.filter.into());
        Ok(unpremultiply(&resized))
    }
}

/// Straight-alpha 8-bit pixels to premultiplied floats.
///
/// Filtering premultiplied values keeps the color of fully transparent
/// pixels out of the result.
fn premultiply(image: &RgbaImage) -> Rgba32FImage {
    Rgba32FImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0.map(|c| c as f32 / 255.0);
        Rgba([r * a, g * a, b * a, a])
    })
}

fn unpremultiply(image: &Rgba32FImage) -> RgbaImage {
    RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let a = a.clamp(0.0, 1.0);
        let alpha = (a * 255.0).round() as u8;
        if alpha == 0 {
            return Rgba([0, 0, 0, 0]);
        }
        let channel = |c: f32| ((c / a).clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([channel(r), channel(g), channel(b), alpha])
    })
}

/// Produces the square variant of a layer at one output resolution.
pub struct Resampler {
    backend: Box<dyn Resample>,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new(FilterResampler::default())
    }
}

impl Resampler {
    pub fn new(backend: impl Resample + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Resizes `image` to exactly `size x size`.
    ///
    /// On any failure the un-resized input is returned as a degraded result,
    /// so one bad resolution never blocks the others. Encoded PNG bytes that
    /// are already `size x size` pass through without re-encoding.
    pub fn resize(&self, image: &LayerImage, size: u32) -> Rendered<LayerImage> {
        let pixels = match image.to_rgba() {
            Ok(pixels) => pixels,
            Err(err) => {
                return Rendered::Degraded {
                    fallback: image.clone(),
                    reason: err.to_string(),
                };
            }
        };

        if let LayerImage::Encoded(bytes) = image {
            let is_png = matches!(image::guess_format(bytes), Ok(ImageFormat::Png));
            if is_png && pixels.dimensions() == (size, size) {
                return Rendered::Clean(image.clone());
            }
        }

        match self.backend.resample(&pixels, size) {
            Ok(resized) => Rendered::Clean(LayerImage::Decoded(resized)),
            Err(err) => Rendered::Degraded {
                fallback: image.clone(),
                reason: err.to_string(),
            },
        }
    }
}

impl std::fmt::Debug for Resampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resampler").finish_non_exhaustive()
    }
}
