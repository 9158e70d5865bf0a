//! JPEG encoding and the size-convergence loop

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

use crate::config::CompressionPreset;
use crate::error::Result;
use crate::processing::resize::shrink_to_fit;

/// Outcome of driving one prepared image under its preset budgets
#[derive(Debug, Clone)]
pub struct ConvergenceOutcome {
    /// Final encoded JPEG stream
    pub bytes: Vec<u8>,

    /// Quality of the final encode
    pub quality: u8,

    /// Number of quality-reduction iterations performed
    pub iterations: u32,

    /// Dimensions of the final encode
    pub width: u32,
    pub height: u32,

    /// Whether the terminal fallback resize was taken
    pub fallback_applied: bool,

    /// Whether the byte budget was met (always true without a size target)
    pub met_target: bool,
}

/// Encode an image as JPEG at the given quality into memory
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    image.write_with_encoder(encoder)?;
    Ok(buffer)
}

/// Drive one flattened, dimension-capped image under its byte budget.
///
/// Encodes at the preset's initial quality, then greedily walks quality
/// down while the stream is over budget. A step is only taken when it
/// stays at or above the floor, so the floor is never crossed no matter
/// how many retries the budget allows. If the loop alone is not enough
/// and the preset carries a fallback, the image is resized once more to
/// the tighter cap and re-encoded at the fallback quality; whatever size
/// that yields is accepted.
pub fn converge_to_target(
    mut image: DynamicImage,
    preset: &CompressionPreset,
) -> Result<ConvergenceOutcome> {
    let mut quality = preset.quality;
    let mut bytes = encode_jpeg(&image, quality)?;
    let mut iterations = 0;
    let mut fallback_applied = false;

    if let Some(target) = &preset.size_target {
        let limit = target.max_bytes();

        while bytes.len() as u64 > limit
            && iterations < target.max_iterations
            && quality.saturating_sub(target.quality_step) >= target.quality_floor
        {
            quality -= target.quality_step;
            iterations += 1;
            bytes = encode_jpeg(&image, quality)?;
            debug!(
                "Reduced quality to {}, new size: {:.2}MB",
                quality,
                megabytes(bytes.len())
            );
        }

        if bytes.len() as u64 > limit {
            if let Some(fallback) = &target.fallback {
                if let Some(resized) = shrink_to_fit(&image, fallback.max_dimension) {
                    image = resized;
                    quality = fallback.quality;
                    bytes = encode_jpeg(&image, quality)?;
                    fallback_applied = true;
                    debug!(
                        "Fallback resize to {}x{} at quality {}: {:.2}MB",
                        image.width(),
                        image.height(),
                        quality,
                        megabytes(bytes.len())
                    );
                }
            }
        }
    }

    let met_target = preset
        .size_target
        .as_ref()
        .map_or(true, |target| bytes.len() as u64 <= target.max_bytes());

    Ok(ConvergenceOutcome {
        width: image.width(),
        height: image.height(),
        bytes,
        quality,
        iterations,
        fallback_applied,
        met_target,
    })
}

fn megabytes(bytes: usize) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
