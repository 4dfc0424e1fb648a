// SPDX-License-Identifier: MIT

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::fleet::{DEFAULT_PARALLEL, DiscoveryOptions, Mode};

/// Tunables, read from an optional TOML file and overridden from the command line.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mode: Mode,
    pub parallel: usize,
    pub poll_interval_ms: u64,
    /// Pause after the kernel re-reads a new partition table.
    pub settle_delay_ms: u64,
    pub max_wait_secs: Option<u64>,
    pub preserve_disk_id: bool,
    /// Device names never treated as targets.
    pub ignore: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Batch,
            parallel: DEFAULT_PARALLEL,
            poll_interval_ms: 100,
            settle_delay_ms: 2000,
            max_wait_secs: None,
            preserve_disk_id: true,
            ignore: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.parallel == 0 {
            anyhow::bail!("parallel must be at least 1");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be at least 1");
        }
        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn discovery(&self) -> DiscoveryOptions {
        DiscoveryOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }
}
