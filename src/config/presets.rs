//! Compression presets for different deployment targets

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SizeBoundError};

/// A compression preset defines how an image is driven under its budgets.
///
/// One preset parameterizes the whole transform: the initial longest-side
/// cap, the starting JPEG quality, an optional byte-size target with its
/// quality-reduction schedule, and where the output lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionPreset {
    /// Longest-side cap in pixels for the initial resize
    pub max_dimension: u32,

    /// Initial JPEG encode quality (1-100)
    pub quality: u8,

    /// Byte-size budget and reduction schedule (None = single encode pass)
    #[serde(default)]
    pub size_target: Option<SizeTarget>,

    /// Skip files already at or under the byte target
    #[serde(default)]
    pub pass_through: bool,

    /// Where the output file lands relative to the source
    #[serde(default)]
    pub output: OutputMode,
}

/// Byte-size budget with the quality-reduction schedule used to reach it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeTarget {
    /// Maximum acceptable output size in megabytes
    pub max_size_mb: f64,

    /// Lowest quality the reduction loop will ever encode at
    pub quality_floor: u8,

    /// Quality decrement per iteration
    pub quality_step: u8,

    /// Hard cap on reduction iterations
    pub max_iterations: u32,

    /// One more, more aggressive resize when the loop alone is not enough
    #[serde(default)]
    pub fallback: Option<FallbackResize>,
}

impl SizeTarget {
    /// Byte-size budget as bytes
    pub fn max_bytes(&self) -> u64 {
        (self.max_size_mb * 1024.0 * 1024.0) as u64
    }
}

/// Terminal resize applied when quality reduction alone cannot meet the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackResize {
    /// Longest-side cap in pixels, tighter than the preset's initial cap
    pub max_dimension: u32,

    /// Fixed quality for the single re-encode after the fallback resize
    pub quality: u8,
}

/// Where the output file lands relative to the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Overwrite in place; PNG sources become a `.jpg` and the original is removed
    #[default]
    Replace,

    /// Emit a `.jpg` next to the untouched original
    Sibling,
}

impl OutputMode {
    /// Destination path for a given source. Output is always JPEG.
    pub fn destination(self, input: &Path) -> PathBuf {
        input.with_extension("jpg")
    }

    /// Whether a source at a different path than the destination is removed
    pub fn removes_source(self) -> bool {
        matches!(self, OutputMode::Replace)
    }
}

impl CompressionPreset {
    /// Create a preset with just a dimension cap and quality (single encode pass)
    pub fn dimension_only(max_dimension: u32, quality: u8) -> Self {
        Self {
            max_dimension,
            quality,
            size_target: None,
            pass_through: false,
            output: OutputMode::Replace,
        }
    }

    /// Set the byte-size target and reduction schedule
    pub fn size_target(mut self, target: SizeTarget) -> Self {
        self.size_target = Some(target);
        self
    }

    /// Enable the pass-through check
    pub fn pass_through(mut self, enabled: bool) -> Self {
        self.pass_through = enabled;
        self
    }

    /// Set the output mode
    pub fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Validate the preset configuration
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(SizeBoundError::invalid_parameters(format!(
                "Quality must be between 1-100, got {}",
                self.quality
            )));
        }

        if self.max_dimension == 0 || self.max_dimension > 32768 {
            return Err(SizeBoundError::invalid_parameters(format!(
                "Max dimension must be between 1-32768, got {}",
                self.max_dimension
            )));
        }

        if self.pass_through && self.size_target.is_none() {
            return Err(SizeBoundError::invalid_parameters(
                "Pass-through requires a size target",
            ));
        }

        if let Some(target) = &self.size_target {
            if target.max_size_mb <= 0.0 {
                return Err(SizeBoundError::invalid_parameters(format!(
                    "Size target must be positive, got {}MB",
                    target.max_size_mb
                )));
            }

            if target.quality_floor == 0 || target.quality_floor > self.quality {
                return Err(SizeBoundError::invalid_parameters(format!(
                    "Quality floor must be between 1 and the initial quality {}, got {}",
                    self.quality, target.quality_floor
                )));
            }

            if target.quality_step == 0 {
                return Err(SizeBoundError::invalid_parameters(
                    "Quality step must be greater than 0",
                ));
            }

            if target.max_iterations == 0 {
                return Err(SizeBoundError::invalid_parameters(
                    "Max iterations must be greater than 0",
                ));
            }

            if let Some(fallback) = &target.fallback {
                if fallback.max_dimension == 0 || fallback.max_dimension > self.max_dimension {
                    return Err(SizeBoundError::invalid_parameters(format!(
                        "Fallback dimension must be between 1 and the initial cap {}, got {}",
                        self.max_dimension, fallback.max_dimension
                    )));
                }
                if fallback.quality == 0 || fallback.quality > 100 {
                    return Err(SizeBoundError::invalid_parameters(format!(
                        "Fallback quality must be between 1-100, got {}",
                        fallback.quality
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Predefined presets for common deployment targets
pub struct Presets;

impl Presets {
    /// Hero images: cap at 1920px, single encode at quality 82,
    /// sibling `.jpg` output so the originals survive.
    pub fn hero() -> CompressionPreset {
        CompressionPreset {
            max_dimension: 1920,
            quality: 82,
            size_target: None,
            pass_through: false,
            output: OutputMode::Sibling,
        }
    }

    /// Portfolio images: keep everything under 10MB, skipping files
    /// already below the cap.
    pub fn portfolio() -> CompressionPreset {
        CompressionPreset {
            max_dimension: 4000,
            quality: 85,
            size_target: Some(SizeTarget {
                max_size_mb: 10.0,
                quality_floor: 40,
                quality_step: 10,
                max_iterations: 6,
                fallback: Some(FallbackResize {
                    max_dimension: 3000,
                    quality: 75,
                }),
            }),
            pass_through: true,
            output: OutputMode::Replace,
        }
    }

    /// Web delivery: drive every image toward ~0.8MB regardless of its
    /// current size.
    pub fn aggressive() -> CompressionPreset {
        CompressionPreset {
            max_dimension: 2000,
            quality: 75,
            size_target: Some(SizeTarget {
                max_size_mb: 0.8,
                quality_floor: 50,
                quality_step: 5,
                max_iterations: 8,
                fallback: Some(FallbackResize {
                    max_dimension: 1500,
                    quality: 75,
                }),
            }),
            pass_through: false,
            output: OutputMode::Replace,
        }
    }

    /// Look up a builtin preset by name
    pub fn builtin(name: &str) -> Option<&'static CompressionPreset> {
        BUILTIN_PRESETS.get(name)
    }

    /// Names of all builtin presets, sorted
    pub fn names() -> Vec<&'static str> {
        let mut names: Vec<&'static str> = BUILTIN_PRESETS.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Get all builtin presets keyed by name
    pub fn all() -> HashMap<String, CompressionPreset> {
        BUILTIN_PRESETS
            .iter()
            .map(|(name, preset)| ((*name).to_string(), preset.clone()))
            .collect()
    }
}

static BUILTIN_PRESETS: Lazy<HashMap<&'static str, CompressionPreset>> = Lazy::new(|| {
    let mut presets = HashMap::new();
    presets.insert("hero", Presets::hero());
    presets.insert("portfolio", Presets::portfolio());
    presets.insert("aggressive", Presets::aggressive());
    presets
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_values() {
        let hero = Presets::hero();
        assert_eq!(hero.max_dimension, 1920);
        assert_eq!(hero.quality, 82);
        assert!(hero.size_target.is_none());
        assert!(!hero.pass_through);
        assert_eq!(hero.output, OutputMode::Sibling);

        let portfolio = Presets::portfolio();
        let target = portfolio.size_target.as_ref().unwrap();
        assert_eq!(target.max_size_mb, 10.0);
        assert_eq!(target.quality_floor, 40);
        assert_eq!(target.quality_step, 10);
        assert_eq!(target.max_iterations, 6);
        assert_eq!(target.fallback.as_ref().unwrap().max_dimension, 3000);
        assert!(portfolio.pass_through);

        let aggressive = Presets::aggressive();
        let target = aggressive.size_target.as_ref().unwrap();
        assert_eq!(target.max_bytes(), (0.8 * 1024.0 * 1024.0) as u64);
        assert_eq!(target.quality_step, 5);
        assert_eq!(target.fallback.as_ref().unwrap().max_dimension, 1500);
    }

    #[test]
    fn test_builtins_validate() {
        for name in Presets::names() {
            let preset = Presets::builtin(name).unwrap();
            assert!(preset.validate().is_ok(), "builtin '{}' failed", name);
        }
        assert_eq!(Presets::names(), vec!["aggressive", "hero", "portfolio"]);
    }

    #[test]
    fn test_validation_rejects_bad_presets() {
        let mut preset = Presets::portfolio();
        preset.quality = 101;
        assert!(preset.validate().is_err());

        let mut preset = Presets::portfolio();
        preset.size_target.as_mut().unwrap().quality_floor = 90;
        assert!(preset.validate().is_err());

        let mut preset = Presets::portfolio();
        preset.size_target.as_mut().unwrap().quality_step = 0;
        assert!(preset.validate().is_err());

        let mut preset = Presets::portfolio();
        preset.size_target.as_mut().unwrap().fallback = Some(FallbackResize {
            max_dimension: 5000,
            quality: 75,
        });
        assert!(preset.validate().is_err());

        let mut preset = Presets::hero();
        preset.pass_through = true;
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_output_destinations() {
        let png = Path::new("images/photo.png");
        let jpg = Path::new("images/photo.jpg");

        assert_eq!(
            OutputMode::Sibling.destination(png),
            PathBuf::from("images/photo.jpg")
        );
        assert_eq!(
            OutputMode::Replace.destination(jpg),
            PathBuf::from("images/photo.jpg")
        );
        assert!(OutputMode::Replace.removes_source());
        assert!(!OutputMode::Sibling.removes_source());
    }

    #[test]
    fn test_preset_serde_roundtrip() {
        let preset = Presets::portfolio();
        let toml_str = toml::to_string_pretty(&preset).unwrap();
        let parsed: CompressionPreset = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.max_dimension, preset.max_dimension);
        assert_eq!(
            parsed.size_target.unwrap().max_iterations,
            preset.size_target.unwrap().max_iterations
        );
    }

    #[test]
    fn test_builder_methods() {
        let preset = CompressionPreset::dimension_only(1600, 80)
            .size_target(SizeTarget {
                max_size_mb: 2.0,
                quality_floor: 55,
                quality_step: 5,
                max_iterations: 5,
                fallback: None,
            })
            .pass_through(true)
            .output(OutputMode::Sibling);

        assert!(preset.validate().is_ok());
        assert_eq!(preset.max_dimension, 1600);
        assert!(preset.pass_through);
        assert_eq!(preset.output, OutputMode::Sibling);
    }
}
