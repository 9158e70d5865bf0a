//! Core image recompression functionality

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::{CompressionPreset, ProcessingConfig};
use crate::error::{ErrorContext, Result, SizeBoundError};

pub mod encode;
pub mod flatten;
pub mod formats;
pub mod resize;
pub mod validation;

pub use encode::*;
pub use flatten::*;
pub use formats::*;
pub use resize::*;
pub use validation::*;

/// How finished bytes reach the destination file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Write the destination directly
    #[default]
    Direct,

    /// Write a temporary sibling, verify it decodes as JPEG, then rename
    /// over the destination
    AtomicReplace,
}

/// Core engine applying one preset to one file at a time
pub struct CompressionEngine {
    validator: Arc<ImageValidator>,
    write_policy: WritePolicy,
    enable_mmap: bool,
}

impl CompressionEngine {
    /// Create a new engine with default limits and direct writes
    pub fn new() -> Self {
        Self {
            validator: Arc::new(ImageValidator::new()),
            write_policy: WritePolicy::Direct,
            enable_mmap: true,
        }
    }

    /// Create an engine from processing configuration
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            validator: Arc::new(ImageValidator::from_config(config)),
            write_policy: if config.atomic_replace {
                WritePolicy::AtomicReplace
            } else {
                WritePolicy::Direct
            },
            enable_mmap: config.enable_mmap,
        }
    }

    /// Set the write policy
    pub fn write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }

    /// Process a single file, deriving the destination from the preset's
    /// output mode
    pub async fn process_file<P: AsRef<Path>>(
        &self,
        input_path: P,
        preset: &CompressionPreset,
    ) -> Result<CompressionResult> {
        let input_path = input_path.as_ref();
        let output_path = preset.output.destination(input_path);
        self.process_file_to(input_path, &output_path, preset).await
    }

    /// Process a single file to an explicit destination
    pub async fn process_file_to(
        &self,
        input_path: &Path,
        output_path: &Path,
        preset: &CompressionPreset,
    ) -> Result<CompressionResult> {
        let start_time = Instant::now();
        preset.validate()?;

        debug!("Processing file: {:?} -> {:?}", input_path, output_path);

        let validation = self
            .validator
            .validate_file(input_path)
            .await
            .with_file_context(input_path.to_path_buf())?;
        let input_size = validation.file_size;

        // Pass-through: files already under the byte budget are untouched
        if preset.pass_through {
            if let Some(target) = &preset.size_target {
                if input_size <= target.max_bytes() {
                    debug!(
                        "{:?}: {:.2}MB already under limit, skipping",
                        input_path,
                        input_size as f64 / 1024.0 / 1024.0
                    );
                    return Ok(CompressionResult::skipped(
                        input_path,
                        input_size,
                        start_time.elapsed().as_millis() as u64,
                    ));
                }
            }
        }

        let (image, source_info) = self.load_image(input_path, &validation).await?;
        self.validator
            .check_pixels(image.width(), image.height(), input_path)?;

        // Flatten, resize and converge off the async runtime
        let outcome = tokio::task::spawn_blocking({
            let preset = preset.clone();
            move || -> Result<ConvergenceOutcome> {
                let flat = flatten_onto_black(&image);
                let sized = match shrink_to_fit(&flat, preset.max_dimension) {
                    Some(resized) => resized,
                    None => flat,
                };
                converge_to_target(sized, &preset)
            }
        })
        .await
        .map_err(|e| SizeBoundError::system(format!("Task join error: {}", e)))??;

        let output_size = outcome.bytes.len() as u64;
        self.write_output(output_path, &outcome.bytes).await?;

        // An extension change under Replace leaves the source behind
        if preset.output.removes_source() && input_path != output_path {
            fs::remove_file(input_path)
                .await
                .with_file_context(input_path.to_path_buf())?;
        }

        debug!(
            "Compressed {:?}: {:.2}MB -> {:.2}MB ({}x{}, quality {})",
            input_path,
            input_size as f64 / 1024.0 / 1024.0,
            output_size as f64 / 1024.0 / 1024.0,
            outcome.width,
            outcome.height,
            outcome.quality
        );

        Ok(CompressionResult {
            input_path: input_path.to_path_buf(),
            output_path: output_path.to_path_buf(),
            action: FileAction::Compressed,
            input_size,
            output_size,
            source_dimensions: Some((source_info.width, source_info.height)),
            output_dimensions: Some((outcome.width, outcome.height)),
            final_quality: Some(outcome.quality),
            iterations: outcome.iterations,
            fallback_applied: outcome.fallback_applied,
            met_target: outcome.met_target,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    /// Load an image from file
    async fn load_image(
        &self,
        path: &Path,
        validation: &ValidationResult,
    ) -> Result<(image::DynamicImage, ImageInfo)> {
        debug!("Loading image: {:?}", path);

        // Memory-map genuinely large inputs instead of buffering them
        const MMAP_THRESHOLD: u64 = 100 * 1024 * 1024;
        let use_mmap = self.enable_mmap && validation.file_size > MMAP_THRESHOLD;

        let image = if use_mmap {
            self.load_image_mmap(path).await?
        } else {
            self.load_image_standard(path).await?
        };

        let info = ImageInfo {
            path: path.to_path_buf(),
            width: image.width(),
            height: image.height(),
            format: validation.format,
            file_size: validation.file_size,
            pixel_count: u64::from(image.width()) * u64::from(image.height()),
        };

        debug!(
            "Loaded image: {}x{} ({} pixels, {:.2}MB)",
            info.width,
            info.height,
            info.pixel_count,
            info.file_size as f64 / 1024.0 / 1024.0
        );

        Ok((image, info))
    }

    /// Load image using standard file I/O
    async fn load_image_standard(&self, path: &Path) -> Result<image::DynamicImage> {
        let data = fs::read(path)
            .await
            .with_file_context(path.to_path_buf())?;

        let image = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            move || -> Result<image::DynamicImage> {
                image::load_from_memory(&data).map_err(|e| {
                    SizeBoundError::validation(
                        format!("Failed to decode image: {}", e),
                        Some(path),
                    )
                })
            }
        })
        .await
        .map_err(|e| SizeBoundError::system(format!("Task join error: {}", e)))??;

        Ok(image)
    }

    /// Load image using memory mapping (for large files)
    async fn load_image_mmap(&self, path: &Path) -> Result<image::DynamicImage> {
        use memmap2::MmapOptions;
        use std::fs::File;

        debug!("Using memory mapping for large file: {:?}", path);

        let file = File::open(path).with_file_context(path.to_path_buf())?;

        let mmap = unsafe {
            MmapOptions::new()
                .map(&file)
                .with_file_context(path.to_path_buf())?
        };

        let image = tokio::task::spawn_blocking({
            let path = path.to_path_buf();
            move || -> Result<image::DynamicImage> {
                image::load_from_memory(&mmap).map_err(|e| {
                    SizeBoundError::validation(
                        format!("Failed to decode memory-mapped image: {}", e),
                        Some(path),
                    )
                })
            }
        })
        .await
        .map_err(|e| SizeBoundError::system(format!("Task join error: {}", e)))??;

        Ok(image)
    }

    /// Write the finished encode to the destination
    async fn write_output(&self, output_path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_file_context(output_path.to_path_buf())?;
            }
        }

        match self.write_policy {
            WritePolicy::Direct => {
                fs::write(output_path, bytes)
                    .await
                    .with_file_context(output_path.to_path_buf())?;
            }
            WritePolicy::AtomicReplace => {
                let temp_path = temp_sibling(output_path);
                fs::write(&temp_path, bytes)
                    .await
                    .with_file_context(temp_path.clone())?;

                self.verify_written(&temp_path, bytes.len() as u64).await?;

                fs::rename(&temp_path, output_path)
                    .await
                    .with_file_context(output_path.to_path_buf())?;
            }
        }

        Ok(())
    }

    /// Verify a freshly written temporary file before the rename
    async fn verify_written(&self, path: &Path, expected_len: u64) -> Result<()> {
        let metadata = fs::metadata(path)
            .await
            .with_file_context(path.to_path_buf())?;

        if metadata.len() != expected_len {
            return Err(SizeBoundError::verification(
                format!(
                    "Wrote {} bytes but found {} on disk",
                    expected_len,
                    metadata.len()
                ),
                Some(path.to_path_buf()),
            ));
        }

        let mut file = fs::File::open(path)
            .await
            .with_file_context(path.to_path_buf())?;
        let mut header = [0u8; 3];
        file.read_exact(&mut header)
            .await
            .with_file_context(path.to_path_buf())?;

        if !is_jpeg_header(&header) {
            return Err(SizeBoundError::verification(
                "Written file does not carry a JPEG header".to_string(),
                Some(path.to_path_buf()),
            ));
        }

        Ok(())
    }
}

impl Default for CompressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Temporary sibling path used by the atomic-replace write policy
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Information about an image file
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
    pub file_size: u64,
    pub pixel_count: u64,
}

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    /// Left untouched by the pass-through check
    Skipped,

    /// Recompressed and written
    Compressed,
}

/// Result of processing one file
#[derive(Debug, Clone, Serialize)]
pub struct CompressionResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub action: FileAction,
    pub input_size: u64,
    pub output_size: u64,
    pub source_dimensions: Option<(u32, u32)>,
    pub output_dimensions: Option<(u32, u32)>,
    pub final_quality: Option<u8>,
    pub iterations: u32,
    pub fallback_applied: bool,
    pub met_target: bool,
    pub elapsed_ms: u64,
}

impl CompressionResult {
    /// Result for a file left untouched by the pass-through check
    fn skipped(input_path: &Path, input_size: u64, elapsed_ms: u64) -> Self {
        Self {
            input_path: input_path.to_path_buf(),
            output_path: input_path.to_path_buf(),
            action: FileAction::Skipped,
            input_size,
            output_size: input_size,
            source_dimensions: None,
            output_dimensions: None,
            final_quality: None,
            iterations: 0,
            fallback_applied: false,
            met_target: true,
            elapsed_ms,
        }
    }

    /// Get compression ratio (input size / output size)
    pub fn compression_ratio(&self) -> f64 {
        if self.output_size == 0 {
            return 1.0;
        }
        self.input_size as f64 / self.output_size as f64
    }

    /// Get size reduction percentage
    pub fn size_reduction(&self) -> f64 {
        if self.input_size == 0 {
            return 0.0;
        }
        let reduction = self.input_size.saturating_sub(self.output_size);
        (reduction as f64 / self.input_size as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Presets;
    use image::{DynamicImage, ImageBuffer, Rgb, Rgba};
    use tempfile::tempdir;

    fn write_rgba_png(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, _| {
            if x % 2 == 0 {
                Rgba([200u8, 120, 40, 255])
            } else {
                Rgba([0u8, 0, 0, 0])
            }
        });
        img.save(path).unwrap();
    }

    fn write_small_jpeg(path: &Path) {
        let img = ImageBuffer::from_pixel(32, 32, Rgb([90u8, 90, 90]));
        DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    #[tokio::test]
    async fn test_hero_emits_sibling_and_keeps_original() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("bghero.png");
        write_rgba_png(&input, 2400, 1500);

        let engine = CompressionEngine::new();
        let result = engine.process_file(&input, &Presets::hero()).await.unwrap();

        assert_eq!(result.action, FileAction::Compressed);
        assert_eq!(result.output_path, dir.path().join("bghero.jpg"));
        assert_eq!(result.output_dimensions, Some((1920, 1200)));
        assert_eq!(result.final_quality, Some(82));
        assert_eq!(result.iterations, 0);
        assert!(result.met_target);

        // Sibling output: original untouched, .jpg alongside
        assert!(input.exists());
        let written = std::fs::read(&result.output_path).unwrap();
        assert!(is_jpeg_header(&written));
    }

    #[tokio::test]
    async fn test_undersized_input_is_not_resized() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("small.png");
        write_rgba_png(&input, 640, 480);

        let engine = CompressionEngine::new();
        let result = engine.process_file(&input, &Presets::hero()).await.unwrap();

        assert_eq!(result.source_dimensions, Some((640, 480)));
        assert_eq!(result.output_dimensions, Some((640, 480)));
    }

    #[tokio::test]
    async fn test_pass_through_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("photo.jpg");
        write_small_jpeg(&input);
        let before = std::fs::read(&input).unwrap();

        let engine = CompressionEngine::new();
        let result = engine
            .process_file(&input, &Presets::portfolio())
            .await
            .unwrap();

        assert_eq!(result.action, FileAction::Skipped);
        assert_eq!(result.input_size, result.output_size);
        assert_eq!(std::fs::read(&input).unwrap(), before);
    }

    #[tokio::test]
    async fn test_replace_removes_png_source() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("shot.png");
        write_rgba_png(&input, 320, 240);

        let engine = CompressionEngine::new();
        let result = engine
            .process_file(&input, &Presets::aggressive())
            .await
            .unwrap();

        assert_eq!(result.output_path, dir.path().join("shot.jpg"));
        assert!(!input.exists());
        assert!(result.output_path.exists());
    }

    #[tokio::test]
    async fn test_replace_overwrites_jpeg_in_place() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("shot.jpg");
        let img = ImageBuffer::from_fn(2400, 1600, |x, y| {
            let v = ((x ^ y) % 251) as u8;
            Rgb([v, v.wrapping_add(40), v.wrapping_mul(7)])
        });
        DynamicImage::ImageRgb8(img).save(&input).unwrap();

        let engine = CompressionEngine::new();
        let result = engine
            .process_file(&input, &Presets::aggressive())
            .await
            .unwrap();

        assert_eq!(result.output_path, input);
        assert!(input.exists());

        // Longest side capped, tighter still if the fallback kicked in
        let (width, height) = result.output_dimensions.unwrap();
        assert!(width.max(height) <= 2000);
        let quality = result.final_quality.unwrap();
        assert!((50..=75).contains(&quality));
        assert!(result.iterations <= 8);
    }

    #[tokio::test]
    async fn test_atomic_replace_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("shot.png");
        write_rgba_png(&input, 320, 240);

        let engine = CompressionEngine::new().write_policy(WritePolicy::AtomicReplace);
        let result = engine
            .process_file(&input, &Presets::aggressive())
            .await
            .unwrap();

        assert!(result.output_path.exists());
        assert!(!dir.path().join("shot.jpg.tmp").exists());
        let written = std::fs::read(&result.output_path).unwrap();
        assert!(is_jpeg_header(&written));
    }

    #[tokio::test]
    async fn test_corrupt_input_is_recoverable_error() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("broken.jpg");
        // Valid magic bytes, invalid stream
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(&[0u8; 64]);
        std::fs::write(&input, &bytes).unwrap();

        let engine = CompressionEngine::new();
        let err = engine
            .process_file(&input, &Presets::aggressive())
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_flattened_output_has_no_alpha() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("transparent.png");
        let img = ImageBuffer::from_pixel(64, 64, Rgba([255u8, 255, 255, 0]));
        img.save(&input).unwrap();

        let engine = CompressionEngine::new();
        let result = engine.process_file(&input, &Presets::hero()).await.unwrap();

        let reloaded = image::open(&result.output_path).unwrap();
        assert!(!reloaded.color().has_alpha());
        // Fully transparent white flattens to black
        let pixel = reloaded.to_rgb8().get_pixel(32, 32).0;
        assert!(pixel.iter().all(|&c| c < 8), "pixel was {:?}", pixel);
    }

    #[test]
    fn test_result_metrics() {
        let result = CompressionResult {
            input_path: PathBuf::from("input.jpg"),
            output_path: PathBuf::from("output.jpg"),
            action: FileAction::Compressed,
            input_size: 1_000_000,
            output_size: 250_000,
            source_dimensions: Some((1000, 800)),
            output_dimensions: Some((500, 400)),
            final_quality: Some(75),
            iterations: 1,
            fallback_applied: false,
            met_target: true,
            elapsed_ms: 20,
        };

        assert!((result.compression_ratio() - 4.0).abs() < 0.1);
        assert!((result.size_reduction() - 75.0).abs() < 0.1);
    }

    #[test]
    fn test_temp_sibling_path() {
        assert_eq!(
            temp_sibling(Path::new("dir/photo.jpg")),
            PathBuf::from("dir/photo.jpg.tmp")
        );
    }
}
