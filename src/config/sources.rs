use std::fmt::Debug;
use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Flush policy of the sample accumulators.
///
/// A flush happens when either threshold is hit first. Setting a threshold to 0 disables it;
/// at least one of them must stay enabled or samples would never leave the builders.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Number of accepted samples that triggers a flush
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,

    /// Maximum time (ms) samples are held before a flush
    #[serde(default = "default_max_time_in_ms")]
    pub max_time_in_ms: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            max_time_in_ms: default_max_time_in_ms(),
        }
    }
}

impl SourcesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_samples == 0 && self.max_time_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sources.max_samples and sources.max_time_in_ms cannot both be 0".into(),
            )));
        }

        if self.max_time_in_ms > 0 && self.max_time_in_ms < 10 {
            warn!(
                "sources.max_time_in_ms ({}) is very low, every tick will carry few samples",
                self.max_time_in_ms
            );
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Option<Duration> {
        if self.max_time_in_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.max_time_in_ms))
        }
    }
}

fn default_max_samples() -> usize {
    100
}

fn default_max_time_in_ms() -> u64 {
    1000
}
