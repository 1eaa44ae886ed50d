//! Engine configuration.

use serde::Deserialize;
use tb_engine::DEFAULT_MAX_BLOCK;

use crate::{ControllerError, Result};

const SAMPLE_RATES: std::ops::RangeInclusive<u32> = 8_000..=192_000;

/// Settings fixed when a render context is built.
///
/// Deserializes from TOML with every field optional:
///
/// ```toml
/// sample_rate = 44100
/// max_block_size = 512
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Output rate in Hz. A device with another rate overrides it.
    pub sample_rate: u32,
    /// Largest block the engine renders in one piece; sizes the scratch buffers
    pub max_block_size: usize,
    /// Slots in the edit-to-render command queue
    pub command_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            max_block_size: DEFAULT_MAX_BLOCK,
            command_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(ControllerError::Config(format!(
                "sample_rate {} outside {}..={}",
                self.sample_rate,
                SAMPLE_RATES.start(),
                SAMPLE_RATES.end()
            )));
        }
        if self.max_block_size == 0 {
            return Err(ControllerError::Config("max_block_size must be at least 1".into()));
        }
        if self.command_capacity == 0 {
            return Err(ControllerError::Config("command_capacity must be at least 1".into()));
        }
        Ok(())
    }
}
