//! Uniform downscaling against a longest-side cap

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// Target dimensions for fitting an image under a longest-side cap.
///
/// Scaling is uniform, so aspect ratio is preserved; the longest side comes
/// out exactly at the cap and the other side rounds to the nearest pixel
/// (never below 1). Returns `None` when the image already fits.
pub fn shrink_dimensions(width: u32, height: u32, max_dimension: u32) -> Option<(u32, u32)> {
    if width <= max_dimension && height <= max_dimension {
        return None;
    }

    let ratio = f64::from(max_dimension) / f64::from(width.max(height));
    let new_width = ((f64::from(width) * ratio).round() as u32).max(1);
    let new_height = ((f64::from(height) * ratio).round() as u32).max(1);

    Some((new_width, new_height))
}

/// Downscale so the longest side equals the cap.
///
/// Uses Lanczos3 resampling. Returns `None` when no resize is needed.
pub fn shrink_to_fit(image: &DynamicImage, max_dimension: u32) -> Option<DynamicImage> {
    shrink_dimensions(image.width(), image.height(), max_dimension).map(|(width, height)| {
        debug!(
            "Resizing {}x{} -> {}x{}",
            image.width(),
            image.height(),
            width,
            height
        );
        image.resize_exact(width, height, FilterType::Lanczos3)
    })
}
