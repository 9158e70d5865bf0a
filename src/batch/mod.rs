//! Sequential batch processing over a directory listing

use std::path::{Path, PathBuf};
use std::time::Instant;

use console::style;
use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::CompressionPreset;
use crate::error::{Result, SizeBoundError};
use crate::processing::{
    formats::is_supported_input_format, CompressionEngine, CompressionResult, FileAction,
};

/// Discover image files under a root path.
///
/// A missing root is fatal; an existing directory with no matching files
/// yields an empty, valid listing. Results are sorted so processing order
/// is deterministic.
pub fn discover_images(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(SizeBoundError::validation(
            "Input path does not exist".to_string(),
            Some(root.to_path_buf()),
        ));
    }

    if root.is_file() {
        return if has_supported_extension(root) {
            Ok(vec![root.to_path_buf()])
        } else {
            Err(SizeBoundError::unsupported_format(
                root.extension()
                    .and_then(|ext| ext.to_str())
                    .unwrap_or("Unknown")
                    .to_string(),
                Some(root.to_path_buf()),
            ))
        };
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_supported_extension(path))
        .collect();

    files.sort();
    Ok(files)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(is_supported_input_format)
        .unwrap_or(false)
}

/// Sequential runner applying one preset across a file list, one file to
/// completion before the next
pub struct BatchRunner<'a> {
    engine: &'a CompressionEngine,
    preset: &'a CompressionPreset,
    progress: Option<&'a ProgressBar>,
}

impl<'a> BatchRunner<'a> {
    /// Create a new runner
    pub fn new(engine: &'a CompressionEngine, preset: &'a CompressionPreset) -> Self {
        Self {
            engine,
            preset,
            progress: None,
        }
    }

    /// Attach a progress bar for per-file reporting
    pub fn with_progress(mut self, progress: &'a ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Process every file in order. Per-file failures are logged and
    /// counted; only non-recoverable errors abort the batch.
    pub async fn run(&self, files: &[PathBuf]) -> Result<BatchSummary> {
        let start_time = Instant::now();
        let mut summary = BatchSummary::default();

        for file_path in files {
            if let Some(progress) = self.progress {
                progress.set_message(
                    file_path
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .to_string(),
                );
            }

            match self.engine.process_file(file_path, self.preset).await {
                Ok(result) => {
                    self.report_file(&result);
                    summary.record(&result);
                }
                Err(e) => {
                    if !e.is_recoverable() {
                        if let Some(progress) = self.progress {
                            progress.abandon_with_message("aborted");
                        }
                        return Err(e);
                    }

                    warn!("Failed to process {}: {}", file_path.display(), e);
                    self.println(format!(
                        "  {} {}: {}",
                        style("✗").red(),
                        file_path.display(),
                        e.user_message()
                    ));
                    summary.failed += 1;
                    summary.failures.push(FileFailure {
                        path: file_path.clone(),
                        message: e.user_message(),
                    });
                }
            }

            if let Some(progress) = self.progress {
                progress.inc(1);
            }
        }

        if let Some(progress) = self.progress {
            progress.finish_with_message("done");
        }

        summary.elapsed_seconds = start_time.elapsed().as_secs_f64();
        Ok(summary)
    }

    /// One human-readable line per processed file
    fn report_file(&self, result: &CompressionResult) {
        let name = result
            .input_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        match result.action {
            FileAction::Skipped => {
                self.println(format!(
                    "  {} {}: {:.2}MB (already under limit)",
                    style("✓").green(),
                    name,
                    megabytes(result.input_size)
                ));
            }
            FileAction::Compressed => {
                let dimensions = result
                    .output_dimensions
                    .map(|(w, h)| format!("{}x{}", w, h))
                    .unwrap_or_default();

                let mut line = format!(
                    "  {} {}: {:.2}MB -> {:.2}MB ({}, quality {})",
                    style("✓").green(),
                    name,
                    megabytes(result.input_size),
                    megabytes(result.output_size),
                    dimensions,
                    result.final_quality.unwrap_or_default()
                );

                if !result.met_target {
                    line.push_str(&format!(
                        " {}",
                        style("⚠ still over budget").yellow()
                    ));
                }

                self.println(line);
            }
        }
    }

    fn println(&self, line: String) {
        match self.progress {
            // Printing through the bar keeps it from garbling the line
            Some(progress) => progress.println(line),
            None => info!("{}", line),
        }
    }
}

/// Aggregate results of one batch run
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub compressed: u32,
    pub skipped: u32,
    pub failed: u32,
    pub over_budget: u32,
    pub total_input_bytes: u64,
    pub total_output_bytes: u64,
    pub elapsed_seconds: f64,
    pub failures: Vec<FileFailure>,
}

/// One failed file with its rendered error
#[derive(Debug, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub message: String,
}

impl BatchSummary {
    fn record(&mut self, result: &CompressionResult) {
        match result.action {
            FileAction::Skipped => self.skipped += 1,
            FileAction::Compressed => {
                self.compressed += 1;
                self.total_input_bytes += result.input_size;
                self.total_output_bytes += result.output_size;
                if !result.met_target {
                    self.over_budget += 1;
                }
            }
        }
    }

    /// Total files seen by the run
    pub fn total(&self) -> u32 {
        self.compressed + self.skipped + self.failed
    }

    /// Get compression ratio across all compressed files
    pub fn compression_ratio(&self) -> f64 {
        if self.total_output_bytes == 0 {
            return 1.0;
        }
        self.total_input_bytes as f64 / self.total_output_bytes as f64
    }

    /// Get size reduction percentage across all compressed files
    pub fn size_reduction(&self) -> f64 {
        if self.total_input_bytes == 0 {
            return 0.0;
        }
        let reduction = self
            .total_input_bytes
            .saturating_sub(self.total_output_bytes);
        (reduction as f64 / self.total_input_bytes as f64) * 100.0
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Presets;
    use image::{ImageBuffer, Rgb, Rgba};
    use tempfile::tempdir;

    fn write_png(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_pixel(width, height, Rgba([120u8, 80, 40, 255]));
        img.save(path).unwrap();
    }

    fn write_jpeg(path: &Path) {
        let img = ImageBuffer::from_pixel(48, 48, Rgb([90u8, 90, 90]));
        image::DynamicImage::ImageRgb8(img).save(path).unwrap();
    }

    #[test]
    fn test_discovery_filters_and_sorts() {
        let dir = tempdir().unwrap();
        write_png(&dir.path().join("b.png"), 8, 8);
        write_jpeg(&dir.path().join("a.jpg"));
        write_jpeg(&dir.path().join("c.JPEG"));
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("noext"), "hi").unwrap();

        let files = discover_images(dir.path(), false).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.JPEG"]);
    }

    #[test]
    fn test_discovery_recursion_is_opt_in() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        write_jpeg(&dir.path().join("top.jpg"));
        write_jpeg(&nested.join("deep.jpg"));

        let flat = discover_images(dir.path(), false).unwrap();
        assert_eq!(flat.len(), 1);

        let recursive = discover_images(dir.path(), true).unwrap();
        assert_eq!(recursive.len(), 2);
    }

    #[test]
    fn test_discovery_missing_root_is_fatal() {
        let err = discover_images(Path::new("/does/not/exist"), false).unwrap_err();
        assert!(matches!(err, SizeBoundError::ValidationError { .. }));
    }

    #[test]
    fn test_discovery_single_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("one.jpg");
        write_jpeg(&file);

        assert_eq!(discover_images(&file, false).unwrap(), vec![file]);

        let other = dir.path().join("one.txt");
        std::fs::write(&other, "hi").unwrap();
        assert!(discover_images(&other, false).is_err());
    }

    #[tokio::test]
    async fn test_batch_continues_past_corrupt_file() {
        let dir = tempdir().unwrap();
        write_jpeg(&dir.path().join("good.jpg"));
        // Valid magic bytes, invalid stream
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0];
        bytes.extend_from_slice(&[0u8; 32]);
        std::fs::write(dir.path().join("bad.jpg"), &bytes).unwrap();
        write_png(&dir.path().join("also-good.png"), 16, 16);

        let engine = CompressionEngine::new();
        let preset = Presets::aggressive();
        let files = discover_images(dir.path(), false).unwrap();
        let summary = BatchRunner::new(&engine, &preset).run(&files).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.compressed, 2);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].path.ends_with("bad.jpg"));
    }

    #[tokio::test]
    async fn test_batch_counts_pass_through() {
        let dir = tempdir().unwrap();
        write_jpeg(&dir.path().join("tiny.jpg"));

        let engine = CompressionEngine::new();
        let preset = Presets::portfolio();
        let files = discover_images(dir.path(), false).unwrap();
        let summary = BatchRunner::new(&engine, &preset).run(&files).await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.compressed, 0);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_summary_metrics() {
        let mut summary = BatchSummary::default();
        summary.total_input_bytes = 1_000_000;
        summary.total_output_bytes = 250_000;

        assert!((summary.compression_ratio() - 4.0).abs() < 0.1);
        assert!((summary.size_reduction() - 75.0).abs() < 0.1);

        let empty = BatchSummary::default();
        assert_eq!(empty.compression_ratio(), 1.0);
        assert_eq!(empty.size_reduction(), 0.0);
    }
}
