use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{PluginError, Result};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Series store location.
    pub storage: StorageConfig,
    /// HTTP server configuration (optional).
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-plugin sample counts handed to plugins at construction,
    /// e.g. `videos = 10`.
    #[serde(default)]
    pub sampling_hints: HashMap<String, usize>,
    /// External encoder / demuxer binaries.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Summary writer defaults.
    #[serde(default)]
    pub writer: WriterConfig,
}

/// HTTP server configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Whether `serve` should start the HTTP listener.
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    /// Port to listen on.
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { enabled: default_server_enabled(), port: default_server_port() }
    }
}

fn default_server_enabled() -> bool { true }
fn default_server_port() -> u16 { 6006 }

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding `series.log`. Created if missing.
    pub base_path: PathBuf,
}

/// Paths (or bare names resolved through `$PATH`) of the ffmpeg tools.
#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { ffmpeg: default_ffmpeg(), ffprobe: default_ffprobe() }
    }
}

fn default_ffmpeg() -> PathBuf { PathBuf::from("ffmpeg") }
fn default_ffprobe() -> PathBuf { PathBuf::from("ffprobe") }

#[derive(Debug, Deserialize, Clone)]
pub struct WriterConfig {
    /// Playback rate stored with each summary.
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Videos kept per summary; extras are dropped.
    #[serde(default = "default_max_outputs")]
    pub max_outputs: i64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { fps: default_fps(), max_outputs: default_max_outputs() }
    }
}

fn default_fps() -> u32 { 4 }
fn default_max_outputs() -> i64 { 3 }

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PluginError::Config(format!("Cannot read config file: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| PluginError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(PluginError::Config("server.port must be > 0".into()));
        }
        if self.writer.fps == 0 {
            return Err(PluginError::Config("writer.fps must be > 0".into()));
        }
        if self.writer.max_outputs < 0 {
            return Err(PluginError::Config("writer.max_outputs must be >= 0".into()));
        }
        if let Some((name, _)) = self.sampling_hints.iter().find(|(_, n)| **n == 0) {
            return Err(PluginError::Config(format!(
                "sampling_hints.{name} must be > 0"
            )));
        }
        Ok(())
    }
}
