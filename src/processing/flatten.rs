//! Alpha and palette flattening ahead of lossy encoding

use image::{DynamicImage, RgbImage};
use tracing::debug;

/// Whether an image carries an alpha channel that must be flattened
pub fn needs_flatten(image: &DynamicImage) -> bool {
    image.color().has_alpha()
}

/// Composite an image onto an opaque black canvas of identical dimensions.
///
/// Palette sources arrive from the decoder already expanded to full color,
/// so the only work left is the alpha channel: each channel is scaled by
/// the pixel's alpha against black, which turns fully transparent pixels
/// black. Opaque sources are converted to 8-bit RGB unchanged.
pub fn flatten_onto_black(image: &DynamicImage) -> DynamicImage {
    if !needs_flatten(image) {
        return DynamicImage::ImageRgb8(image.to_rgb8());
    }

    debug!(
        "Flattening {:?} image onto black background",
        image.color()
    );

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut flat = RgbImage::new(width, height);

    for (out, pixel) in flat.pixels_mut().zip(rgba.pixels()) {
        let alpha = u16::from(pixel[3]);
        out[0] = ((u16::from(pixel[0]) * alpha) / 255) as u8;
        out[1] = ((u16::from(pixel[1]) * alpha) / 255) as u8;
        out[2] = ((u16::from(pixel[2]) * alpha) / 255) as u8;
    }

    DynamicImage::ImageRgb8(flat)
}
