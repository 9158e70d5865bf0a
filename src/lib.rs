//! SizeBound - Size-Bounded Batch Image Recompressor
//!
//! Batch-resizes and recompresses raster images (PNG/JPEG) to fit byte-size
//! and pixel-dimension budgets for web deployment. One parameterized
//! transform drives every image: normalize color, cap the longest side,
//! encode, then walk quality down until the byte budget is met or the
//! retry budget runs out.
//!
//! # Features
//!
//! - **Named presets**: `hero`, `portfolio` and `aggressive` budgets built in
//! - **Bounded convergence**: quality never crosses the configured floor
//! - **Alpha flattening**: transparent and palette sources composite onto black
//! - **Sequential batches**: one file to completion before the next
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sizebound::{CompressionEngine, Presets};
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CompressionEngine::new();
//! let result = engine.process_file(
//!     Path::new("photo.png"),
//!     &Presets::portfolio(),
//! ).await?;
//!
//! println!("Compressed: {} -> {} bytes",
//!          result.input_size, result.output_size);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod error;
pub mod processing;

// Re-export commonly used types
pub use batch::{discover_images, BatchRunner, BatchSummary};
pub use config::{CompressionPreset, Config, OutputMode, Presets, SizeTarget};
pub use error::{Result, SizeBoundError};
pub use processing::{CompressionEngine, CompressionResult, FileAction, WritePolicy};

use tracing::{info, warn};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the SizeBound library with default settings
///
/// This sets up logging and validates system requirements. Should be
/// called once at program start.
pub fn init() -> Result<()> {
    // Initialize tracing subscriber if not already set
    if tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish(),
    )
    .is_ok()
    {
        info!("SizeBound v{} initialized", VERSION);
    }

    validate_system_requirements()?;

    Ok(())
}

/// Initialize with custom configuration
pub fn init_with_config(config: &Config) -> Result<()> {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(&config.logging.level)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        info!("SizeBound v{} initialized with custom config", VERSION);
    }

    validate_system_requirements()?;

    Ok(())
}

fn validate_system_requirements() -> Result<()> {
    use sysinfo::{System, SystemExt};

    let mut system = System::new_all();
    system.refresh_all();

    // Check available memory
    let available_memory = system.available_memory();
    const MIN_MEMORY_MB: u64 = 512; // 512MB minimum

    if available_memory < MIN_MEMORY_MB * 1024 * 1024 {
        warn!(
            "Low available memory: {}MB (recommended: >{}MB)",
            available_memory / (1024 * 1024),
            MIN_MEMORY_MB
        );
    }

    // Validate image library capabilities
    info!("Image format support:");
    info!("  JPEG: {}", image::ImageFormat::Jpeg.can_read());
    info!("  PNG: {}", image::ImageFormat::Png.can_read());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_init() {
        // Should not fail on multiple calls
        let _ = init();
        let _ = init();
    }

    #[test]
    fn test_system_validation() {
        assert!(validate_system_requirements().is_ok());
    }
}
