//! Input validation ahead of decoding

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::config::ProcessingConfig;
use crate::error::{Result, SizeBoundError};
use crate::processing::formats::{
    detect_format_from_header, detect_format_from_path, SourceFormat,
};

/// Validator for checking files before they are handed to the decoder
pub struct ImageValidator {
    max_file_size: u64,
    max_image_pixels: u64,
}

/// Outcome of validating one file
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub path: PathBuf,
    pub file_size: u64,
    pub format: SourceFormat,
    /// Whether the magic bytes agree with the extension
    pub header_valid: bool,
}

impl ImageValidator {
    /// Create a new validator with default limits
    pub fn new() -> Self {
        let defaults = ProcessingConfig::default();
        Self {
            max_file_size: defaults.max_file_size,
            max_image_pixels: defaults.max_image_pixels,
        }
    }

    /// Create a validator from processing configuration
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_image_pixels: config.max_image_pixels,
        }
    }

    /// Create a validator with custom limits
    pub fn with_limits(max_file_size: u64, max_image_pixels: u64) -> Self {
        Self {
            max_file_size,
            max_image_pixels,
        }
    }

    /// Validate a file for processing
    pub async fn validate_file<P: AsRef<Path>>(&self, path: P) -> Result<ValidationResult> {
        let path = path.as_ref();
        debug!("Validating file: {:?}", path);

        let metadata = fs::metadata(path).await.map_err(|e| {
            SizeBoundError::validation(
                format!("Cannot access file: {}", e),
                Some(path.to_path_buf()),
            )
        })?;

        if !metadata.is_file() {
            return Err(SizeBoundError::validation(
                "Path is not a regular file".to_string(),
                Some(path.to_path_buf()),
            ));
        }

        let file_size = metadata.len();

        if file_size == 0 {
            return Err(SizeBoundError::validation(
                "File is empty".to_string(),
                Some(path.to_path_buf()),
            ));
        }

        if file_size > self.max_file_size {
            return Err(SizeBoundError::file_too_large(
                file_size,
                self.max_file_size,
                path.to_path_buf(),
            ));
        }

        let format = detect_format_from_path(path)?;
        let header_valid = self.validate_file_header(path, format).await?;

        Ok(ValidationResult {
            path: path.to_path_buf(),
            file_size,
            format,
            header_valid,
        })
    }

    /// Reject decoded images above the pixel budget
    pub fn check_pixels(&self, width: u32, height: u32, path: &Path) -> Result<()> {
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.max_image_pixels {
            return Err(SizeBoundError::image_too_large(
                width,
                height,
                self.max_image_pixels,
                Some(path.to_path_buf()),
            ));
        }
        Ok(())
    }

    /// Validate magic bytes against the extension-derived format
    async fn validate_file_header(&self, path: &Path, expected: SourceFormat) -> Result<bool> {
        let mut file = fs::File::open(path).await.map_err(|e| {
            SizeBoundError::validation(
                format!("Cannot open file for header validation: {}", e),
                Some(path.to_path_buf()),
            )
        })?;

        let mut header = [0u8; 16];
        let bytes_read = file.read(&mut header).await.map_err(|e| {
            SizeBoundError::validation(
                format!("Cannot read file header: {}", e),
                Some(path.to_path_buf()),
            )
        })?;

        if bytes_read < 8 {
            return Err(SizeBoundError::validation(
                "File too small to contain valid image header".to_string(),
                Some(path.to_path_buf()),
            ));
        }

        let header_format = detect_format_from_header(&header[..bytes_read]).map_err(|_| {
            SizeBoundError::validation(
                "File header does not match any supported image format".to_string(),
                Some(path.to_path_buf()),
            )
        })?;

        if header_format != expected {
            warn!(
                "Format mismatch for {:?}: header indicates {:?}, extension indicates {:?}",
                path, header_format, expected
            );
            return Ok(false);
        }

        Ok(true)
    }
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new()
    }
}
