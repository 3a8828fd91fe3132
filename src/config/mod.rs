//! Server Configuration
//!
//! Settings for the HTTP listener, the model artifact and ranking, stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::vision::Normalization;

/// Server settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings
    pub server: ServerSettings,
    /// Model artifact settings
    pub model: ModelSettings,
    /// Ranking settings
    pub ranking: RankingSettings,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    /// Socket address string for the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Path to the ONNX model file
    pub path: PathBuf,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
    /// Model input width in pixels
    pub input_width: u32,
    /// Model input height in pixels
    pub input_height: u32,
    /// Input normalization applied after resizing
    pub normalization: Normalization,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/efficientnetb0_letters.onnx"),
            intra_threads: 4,
            input_width: 224,
            input_height: 224,
            normalization: Normalization::EfficientNet,
        }
    }
}

/// Ranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingSettings {
    /// Number of entries returned in `top3`
    pub top_k: usize,
    /// Absolute tolerance for treating model output as already normalized
    pub distribution_tolerance: f32,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            distribution_tolerance: 0.01,
        }
    }
}

impl AppConfig {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.server.max_upload_bytes > 0,
            "server.max_upload_bytes must be greater than 0"
        );
        anyhow::ensure!(
            self.model.input_width > 0 && self.model.input_height > 0,
            "model input size must be non-zero, got {}x{}",
            self.model.input_width,
            self.model.input_height
        );
        anyhow::ensure!(
            self.ranking.top_k > 0,
            "ranking.top_k must be at least 1"
        );
        anyhow::ensure!(
            self.ranking.distribution_tolerance.is_finite()
                && self.ranking.distribution_tolerance >= 0.0,
            "ranking.distribution_tolerance must be a non-negative number, got {}",
            self.ranking.distribution_tolerance
        );
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the per-user configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "letterrecognition", "LetterRecognitionServer")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Path of the default config file (`<config dir>/config.toml`)
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}
