use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Reconciliation parameters of the evaluator
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EvaluatorConfig {
    /// Materialize raw per-stream stats onto the persisted records
    #[serde(default)]
    pub fetch_samples: bool,

    /// Grace period (ms) an unvisited entity survives before it is evicted
    #[serde(default = "default_max_idle_time_in_ms")]
    pub max_idle_time_in_ms: u64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            fetch_samples: false,
            max_idle_time_in_ms: default_max_idle_time_in_ms(),
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_idle_time_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "evaluator.max_idle_time_in_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }
}

fn default_max_idle_time_in_ms() -> u64 {
    60_000
}
