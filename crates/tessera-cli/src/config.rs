use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use tessera_sync::ReplicaConfig;

/// Settings read from the optional `--config` TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseraConfig {
    pub replica: ReplicaConfig,
    pub simulate: SimulateConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulateConfig {
    pub replicas: usize,
    pub writes: usize,
    /// How long to wait for handshakes and convergence.
    pub timeout_ms: u64,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            replicas: 3,
            writes: 5,
            timeout_ms: 5_000,
        }
    }
}

impl TesseraConfig {
    /// Load from `path`, or defaults when no file was given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
