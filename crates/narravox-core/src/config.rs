//! Pipeline tuning knobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Segments per annotation call.
    pub batch_size: usize,
    /// Batches dispatched concurrently per window.
    pub parallelism: usize,
    pub max_output_tokens: u32,
    pub temperature: f32,
    /// Deadline for one remote call; a timed-out batch is treated exactly
    /// like a failed batch.
    pub call_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            parallelism: 3,
            max_output_tokens: 2048,
            temperature: 0.4,
            call_timeout_secs: 45,
            cache_ttl_secs: 300,
            cache_capacity: 256,
        }
    }
}

impl PipelineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
