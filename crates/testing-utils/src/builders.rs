//! Configuration builders with short intervals for tests

use modelhub_core::{PoolConfig, ProviderPoolConfig, SchedulerConfig};

/// Scheduler config builder, defaults to 10ms dispatch and 5ms timeout scans
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig {
                processing_interval_ms: 10,
                timeout_check_interval_ms: 5,
                max_task_history: 10_000,
            },
        }
    }

    pub fn with_processing_interval_ms(mut self, ms: u64) -> Self {
        self.config.processing_interval_ms = ms;
        self
    }

    pub fn with_timeout_check_interval_ms(mut self, ms: u64) -> Self {
        self.config.timeout_check_interval_ms = ms;
        self
    }

    pub fn with_max_task_history(mut self, max: usize) -> Self {
        self.config.max_task_history = max;
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    pub fn with_default_pool_size(mut self, size: usize) -> Self {
        self.config.default_pool_size = size;
        self
    }

    pub fn with_health_check_interval_seconds(mut self, seconds: u64) -> Self {
        self.config.health_check_interval_seconds = seconds;
        self
    }

    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.config.acquire_timeout_ms = Some(ms);
        self
    }

    pub fn build(self) -> PoolConfig {
        self.config
    }
}

impl Default for PoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn provider_config(provider_id: &str, pool_size: usize) -> ProviderPoolConfig {
    ProviderPoolConfig::new(provider_id, pool_size)
}
