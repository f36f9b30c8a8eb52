//! CLI configuration file.

use std::path::Path;

use anyhow::{Context, Result};
use autumn_bridge::{BridgeConfig, EngineLaunchConfig};
use serde::{Deserialize, Serialize};

/// Contents of the `--config` JSON file. Both sections are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub bridge: BridgeConfig,
    pub engine: EngineLaunchConfig,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}
