//! Engine configuration (spec §6) and the top-level `Engine` handle that
//! owns the registries a running graph shares: the sidechain bus registry
//! and the shutdown coordinator. Config loading follows the teacher's
//! `orchestrator::config::loader` shape: a `serde_yaml` file merged over
//! built-in defaults, validated once at startup.

use crate::error::ConfigError;
use crate::registry::NodeRegistry;
use crate::sidechain::SidechainRegistry;
use crate::shutdown::ShutdownCoordinator;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// The five bit depths spec §6 allows; represented as an enum rather than
/// a raw integer so an invalid depth can't be constructed at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioBitDepth {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "16")]
    Sixteen,
    #[serde(rename = "24")]
    TwentyFour,
    #[serde(rename = "32")]
    ThirtyTwo,
}

impl AudioBitDepth {
    pub fn bits(self) -> u32 {
        match self {
            AudioBitDepth::One => 1,
            AudioBitDepth::Eight => 8,
            AudioBitDepth::Sixteen => 16,
            AudioBitDepth::TwentyFour => 24,
            AudioBitDepth::ThirtyTwo => 32,
        }
    }
}

/// Configuration applied uniformly to every node in the graph (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub audio_channels: u16,
    pub audio_bit_depth: AudioBitDepth,
    pub audio_little_endian: bool,
    pub audio_sample_rate: u32,
    pub text_encoding: String,
    pub cache_dir: std::path::PathBuf,
    pub control_surface_addr: std::net::SocketAddr,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audio_channels: 1,
            audio_bit_depth: AudioBitDepth::Sixteen,
            audio_little_endian: true,
            audio_sample_rate: 48_000,
            text_encoding: "utf-8".to_string(),
            cache_dir: std::path::PathBuf::from(".speechflow-cache"),
            control_surface_addr: ([127, 0, 0, 1], 7700).into(),
        }
    }
}

impl EngineConfig {
    /// Load from a YAML file, falling back to built-in defaults for any
    /// field the file omits (`#[serde(default)]` on the struct).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: EngineConfig = serde_yaml::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.audio_channels == 0 {
            return Err(ConfigError::InvalidEngineConfig("audio_channels must be >= 1".to_string()));
        }
        if self.audio_sample_rate == 0 {
            return Err(ConfigError::InvalidEngineConfig("audio_sample_rate must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Top-level handle tying configuration to the per-run registries every
/// node and the control surface share: the sidechain bus, the node control
/// registry, and the shutdown coordinator. One `Engine` per graph execution
/// (spec §9: "a single `Engine` value owns the bus registry and the node
/// map; nodes receive a handle, not a global").
pub struct Engine {
    pub config: EngineConfig,
    pub sidechain: Arc<SidechainRegistry>,
    pub nodes: Arc<NodeRegistry>,
    pub shutdown: Arc<ShutdownCoordinator>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sidechain: Arc::new(SidechainRegistry::new()),
            nodes: Arc::new(NodeRegistry::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = EngineConfig::load("/nonexistent/speechflow.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::LoadFailed { .. }));
    }

    #[test]
    fn bit_depth_reports_correct_bit_count() {
        assert_eq!(AudioBitDepth::TwentyFour.bits(), 24);
    }
}
