//! Placement of a layer onto the canonical canvas, and layer compositing.
//!
//! Drawing goes through tiny-skia (re-exported by resvg) so that scaled
//! layers are filtered the same way a 2D canvas `drawImage` call would be.

use image::{Rgba, RgbaImage};
use resvg::tiny_skia::{
    ColorU8, FilterQuality, Pixmap, PixmapPaint, PremultipliedColorU8, Transform,
};

use crate::codec::LayerImage;
use crate::layer::{LayerAdjustment, Rendered};

// ============================================================================
// Placement
// ============================================================================

/// Where a layer lands on the canvas, in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Placement {
    /// Computes the placement for `adjustment` on a `canvas_size` square.
    ///
    /// The scaled layer is centered first, then shifted by `(x, y)`.
    pub fn compute(canvas_size: u32, adjustment: &LayerAdjustment) -> Self {
        let canvas = canvas_size as f32;
        let factor = adjustment.scale_factor();
        let width = canvas * factor;
        let height = canvas * factor;
        Self {
            origin_x: (canvas - width) / 2.0 + adjustment.x,
            origin_y: (canvas - height) / 2.0 + adjustment.y,
            width,
            height,
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            self.origin_x + self.width / 2.0,
            self.origin_y + self.height / 2.0,
        )
    }
}

// ============================================================================
// LayerTransformer
// ============================================================================

/// Renders a layer onto a blank canonical canvas with a given adjustment.
#[derive(Debug, Clone, Copy)]
pub struct LayerTransformer {
    canonical_size: u32,
}

impl LayerTransformer {
    pub fn new(canonical_size: u32) -> Self {
        Self { canonical_size }
    }

    pub fn canonical_size(&self) -> u32 {
        self.canonical_size
    }

    /// Applies `adjustment` to `image`.
    ///
    /// Absent or identity adjustments return the input unchanged, without
    /// decoding. If the source cannot be decoded or drawn, the input itself
    /// is returned as a degraded result.
    pub fn transform(
        &self,
        image: &LayerImage,
        adjustment: Option<&LayerAdjustment>,
    ) -> Rendered<LayerImage> {
        let Some(adjustment) = adjustment.filter(|adj| !adj.is_identity()) else {
            return Rendered::Clean(image.clone());
        };

        let source = match image.to_rgba() {
            Ok(source) => source,
            Err(err) => {
                return Rendered::Degraded {
                    fallback: image.clone(),
                    reason: err.to_string(),
                };
            }
        };

        match self.place(&source, adjustment) {
            Some(canvas) => Rendered::Clean(LayerImage::Decoded(canvas)),
            None => Rendered::Degraded {
                fallback: image.clone(),
                reason: format!(
                    "could not allocate a {0}x{0} canvas for a {1}x{2} source",
                    self.canonical_size,
                    source.width(),
                    source.height()
                ),
            },
        }
    }

    /// Draws `source` scaled and translated onto a transparent canvas.
    ///
    /// Content outside the canvas is clipped by its edges.
    fn place(&self, source: &RgbaImage, adjustment: &LayerAdjustment) -> Option<RgbaImage> {
        let placement = Placement::compute(self.canonical_size, adjustment);
        let src = rgba_image_to_pixmap(source)?;
        let mut canvas = Pixmap::new(self.canonical_size, self.canonical_size)?;

        let sx = placement.width / source.width() as f32;
        let sy = placement.height / source.height() as f32;
        let transform =
            Transform::from_row(sx, 0.0, 0.0, sy, placement.origin_x, placement.origin_y);

        let paint = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..PixmapPaint::default()
        };
        canvas.draw_pixmap(0, 0, src.as_ref(), &paint, transform, None);

        Some(pixmap_to_rgba_image(&canvas))
    }
}

// ============================================================================
// Pixmap Conversion
// ============================================================================

/// Converts an image::RgbaImage into a premultiplied tiny_skia Pixmap.
fn rgba_image_to_pixmap(img: &RgbaImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(img.width(), img.height())?;
    for (dst, src) in pixmap.pixels_mut().iter_mut().zip(img.pixels()) {
        let [r, g, b, a] = src.0;
        *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
    }
    Some(pixmap)
}

/// Converts a tiny_skia Pixmap to an image::RgbaImage.
fn pixmap_to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut img = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in img.pixels_mut().zip(pixmap.pixels()) {
        *dst = unpremultiply(*src);
    }
    img
}

/// Unpremultiplies a premultiplied alpha pixel.
fn unpremultiply(pixel: PremultipliedColorU8) -> Rgba<u8> {
    let a = pixel.alpha();
    if a == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let a_f = a as f32 / 255.0;
    let channel = |c: u8| (c as f32 / a_f).round().min(255.0) as u8;
    Rgba([
        channel(pixel.red()),
        channel(pixel.green()),
        channel(pixel.blue()),
        a,
    ])
}

// ============================================================================
// Compositing
// ============================================================================

/// Stacks `layer` on top of `base` (source-over).
///
/// Both images must have the same dimensions; otherwise `base` is left
/// untouched and `false` is returned.
pub fn composite_over(base: &mut RgbaImage, layer: &RgbaImage) -> bool {
    if base.dimensions() != layer.dimensions() {
        return false;
    }
    for (below, above) in base.pixels_mut().zip(layer.pixels()) {
        *below = source_over(*above, *below);
    }
    true
}

fn source_over(above: Rgba<u8>, below: Rgba<u8>) -> Rgba<u8> {
    let top_a = above[3] as f32 / 255.0;
    let under_a = below[3] as f32 / 255.0 * (1.0 - top_a);
    let alpha = top_a + under_a;
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let mix = |i: usize| {
        let c = (above[i] as f32 * top_a + below[i] as f32 * under_a) / alpha;
        c.round().min(255.0) as u8
    };
    Rgba([mix(0), mix(1), mix(2), (alpha * 255.0).round() as u8])
}

// ============================================================================
// Tests
// ============================================================================
