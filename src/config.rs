use crate::utils::config_io::load_cfg;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_INPUT_CAPACITY: usize = 1024;
const DEFAULT_CONTROL_CAPACITY: usize = 64;
const DEFAULT_HOST_BATCH_CAPACITY: usize = 128;
const DEFAULT_TICK_PERIOD_MS: u64 = 1000;

/// Coordinator knobs. Everything is optional with documented defaults so a
/// `CoordinatorConfig::default()` is always runnable.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Capacity of the upstream batch feed, in batch references
    /// (`None` = 1024). Overflow is the upstream's problem.
    pub input_capacity: Option<usize>,

    /// Max pending control requests (`None` = 64).
    pub control_capacity: Option<usize>,

    /// Capacity of each host's inbound batch queue, in batch references
    /// (`None` = 128). Overflow drops and counts at the host.
    pub host_batch_capacity: Option<usize>,

    /// Period of the coordinator wake-up tick **in milliseconds**
    /// (`None` = 1000).
    pub tick_period_ms: Option<u64>,

    /// Max batches dispatched per loop iteration before control is polled
    /// again (`None` = 64).
    pub max_dispatch_per_iter: Option<usize>,
}

impl CoordinatorConfig {
    /// Load from a config file (format inferred from the extension).
    pub fn from_file(path: impl AsRef<str>) -> anyhow::Result<Self> {
        load_cfg(path)
    }

    pub fn input_capacity(&self) -> usize {
        self.input_capacity.unwrap_or(DEFAULT_INPUT_CAPACITY)
    }

    pub fn control_capacity(&self) -> usize {
        self.control_capacity.unwrap_or(DEFAULT_CONTROL_CAPACITY)
    }

    pub fn host_batch_capacity(&self) -> usize {
        self.host_batch_capacity
            .unwrap_or(DEFAULT_HOST_BATCH_CAPACITY)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms.unwrap_or(DEFAULT_TICK_PERIOD_MS))
    }

    pub fn max_dispatch_per_iter(&self) -> usize {
        self.max_dispatch_per_iter.unwrap_or(64).max(1)
    }
}
