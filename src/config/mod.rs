//! Configuration management for SizeBound

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SizeBoundError};

pub mod presets;
pub use presets::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Compression presets keyed by name
    #[serde(default)]
    pub presets: HashMap<String, CompressionPreset>,

    /// Global processing settings
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            presets: Presets::all(),
            processing: ProcessingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Global processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Process directories recursively
    pub recursive: bool,

    /// Maximum file size to process (in bytes)
    pub max_file_size: u64,

    /// Maximum image dimensions (width * height)
    pub max_image_pixels: u64,

    /// Enable memory-mapped decoding for large files
    pub enable_mmap: bool,

    /// Write outputs via a verified temporary file plus atomic rename
    pub atomic_replace: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            recursive: false,
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_image_pixels: 100_000_000,    // 100 megapixels
            enable_mmap: true,
            atomic_replace: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,

    /// Log file path (None = stdout)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            SizeBoundError::config(format!(
                "Failed to read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        let extension = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(SizeBoundError::config(
                "Unsupported config file format. Use .toml or .yaml",
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let content = match extension.to_lowercase().as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| SizeBoundError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| SizeBoundError::config(format!("YAML serialization failed: {}", e)))?,
            _ => {
                return Err(SizeBoundError::config(
                    "Unsupported config file format. Use .toml or .yaml",
                ))
            }
        };

        std::fs::write(&path, content).map_err(|e| {
            SizeBoundError::config(format!(
                "Failed to write config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;

        Ok(())
    }

    /// Get a compression preset by name
    pub fn get_preset(&self, name: &str) -> Result<&CompressionPreset> {
        self.presets.get(name).ok_or_else(|| {
            SizeBoundError::config(format!(
                "Preset '{}' not found. Available presets: {:?}",
                name,
                self.presets.keys().collect::<Vec<_>>()
            ))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, preset) in &self.presets {
            preset
                .validate()
                .map_err(|e| SizeBoundError::config(format!("Invalid preset '{}': {}", name, e)))?;
        }

        if self.processing.max_file_size == 0 {
            return Err(SizeBoundError::config(
                "Max file size must be greater than 0",
            ));
        }

        if self.processing.max_image_pixels == 0 {
            return Err(SizeBoundError::config(
                "Max image pixels must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Merge with another configuration (other takes precedence)
    pub fn merge(mut self, other: Config) -> Self {
        // Merge presets (other wins on conflicts)
        self.presets.extend(other.presets);

        self.processing = other.processing;
        self.logging = other.logging;

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.presets.contains_key("hero"));
        assert!(config.presets.contains_key("portfolio"));
        assert!(config.presets.contains_key("aggressive"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();

        // Test TOML
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.presets.len(), parsed.presets.len());

        // Test YAML
        let yaml_str = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(config.presets.len(), parsed.presets.len());
    }

    #[test]
    fn test_config_file_io() {
        let config = Config::default();

        // Test TOML file
        let toml_file = NamedTempFile::new().unwrap();
        let toml_path = toml_file.path().with_extension("toml");
        config.to_file(&toml_path).unwrap();
        let loaded = Config::from_file(&toml_path).unwrap();
        assert!(loaded.validate().is_ok());

        // Test YAML file
        let yaml_file = NamedTempFile::new().unwrap();
        let yaml_path = yaml_file.path().with_extension("yaml");
        config.to_file(&yaml_path).unwrap();
        let loaded = Config::from_file(&yaml_path).unwrap();
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_preset_lookup() {
        let config = Config::default();
        assert!(config.get_preset("portfolio").is_ok());
        assert!(config.get_preset("nonexistent").is_err());
    }

    #[test]
    fn test_merge_prefers_other() {
        let base = Config::default();
        let mut other = Config::default();
        other
            .presets
            .insert("custom".to_string(), Presets::hero());
        other.processing.atomic_replace = true;

        let merged = base.merge(other);
        assert!(merged.presets.contains_key("custom"));
        assert!(merged.presets.contains_key("portfolio"));
        assert!(merged.processing.atomic_replace);
    }
}
