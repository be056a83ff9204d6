use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options for mining and verification.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned")]
#[serde(default)]
pub struct MinerConfig {
    /// Search without pausing between nonces.
    #[builder(default)]
    pub turbo: bool,
    /// Where datasets may be persisted. Recorded only; datasets live in memory.
    #[builder(setter(into, strip_option), default)]
    pub dataset_dir: Option<PathBuf>,
    /// Verify against the materialized dataset instead of the light cache.
    #[builder(default)]
    pub force_full_mode: bool,
    /// Worker threads used when racing searchers.
    #[builder(default = "num_cpus::get()")]
    pub threads: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            turbo: false,
            dataset_dir: None,
            force_full_mode: false,
            threads: num_cpus::get(),
        }
    }
}

impl MinerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidConfig("threads must be >= 1".into()));
        }
        Ok(())
    }
}

impl MinerConfigBuilder {
    pub fn build_validated(self) -> Result<MinerConfig> {
        let config = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
