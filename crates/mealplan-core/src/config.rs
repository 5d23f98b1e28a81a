//! Engine tuning knobs, read from the `[engine]` table of the config file.

use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Selection bounds and the generation policy of the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fewest distinct meals a selection may contain.
    pub min_selection: usize,
    /// Most distinct meals a selection may contain.
    pub max_selection: usize,
    /// Upper bound on a single content provider call.
    pub generation_timeout_secs: u64,
    /// Total provider calls per generation step (1 = no retry).
    pub generation_attempts: u32,
    /// Pause between generation attempts.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_selection: 10,
            max_selection: 20,
            generation_timeout_secs: 60,
            generation_attempts: 1,
            retry_backoff_ms: 250,
        }
    }
}

impl EngineConfig {
    pub fn selection_bounds(&self) -> RangeInclusive<usize> {
        self.min_selection..=self.max_selection
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Reject configurations the engine cannot operate with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_selection == 0 {
            anyhow::bail!("engine.min_selection must be at least 1");
        }
        if self.min_selection > self.max_selection {
            anyhow::bail!(
                "engine.min_selection ({}) exceeds engine.max_selection ({})",
                self.min_selection,
                self.max_selection
            );
        }
        if self.generation_attempts == 0 {
            anyhow::bail!("engine.generation_attempts must be at least 1");
        }
        if self.generation_timeout_secs == 0 {
            anyhow::bail!("engine.generation_timeout_secs must be at least 1");
        }
        Ok(())
    }
}
