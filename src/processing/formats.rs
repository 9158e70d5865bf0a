//! Image format detection and handling

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SizeBoundError};

/// Raster formats accepted as input. Output is always JPEG.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jpeg,
    Png,
}

impl SourceFormat {
    /// Get the canonical file extension for this format
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// Get MIME type for this format
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Detect image format from file extension
pub fn detect_format_from_path<P: AsRef<Path>>(path: P) -> Result<SourceFormat> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| {
            SizeBoundError::unsupported_format("Unknown".to_string(), Some(path.to_path_buf()))
        })?;

    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => Ok(SourceFormat::Jpeg),
        "png" => Ok(SourceFormat::Png),
        _ => Err(SizeBoundError::unsupported_format(
            extension.to_string(),
            Some(path.to_path_buf()),
        )),
    }
}

/// Detect image format from file header (magic bytes)
pub fn detect_format_from_header(data: &[u8]) -> Result<SourceFormat> {
    if data.len() < 8 {
        return Err(SizeBoundError::validation(
            "File too small to determine format".to_string(),
            None,
        ));
    }

    if is_jpeg_header(data) {
        return Ok(SourceFormat::Jpeg);
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Ok(SourceFormat::Png);
    }

    Err(SizeBoundError::unsupported_format(
        "Unknown (magic bytes)".to_string(),
        None,
    ))
}

/// Whether a byte stream starts with the JPEG magic bytes (FF D8 FF)
pub fn is_jpeg_header(data: &[u8]) -> bool {
    data.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Get supported input extensions
pub fn supported_input_formats() -> &'static [&'static str] {
    &["jpg", "jpeg", "png"]
}

/// Check if a file extension is supported for input
pub fn is_supported_input_format(extension: &str) -> bool {
    supported_input_formats()
        .iter()
        .any(|&fmt| fmt.eq_ignore_ascii_case(extension))
}
