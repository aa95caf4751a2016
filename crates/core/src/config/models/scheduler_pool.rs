use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 派发循环间隔（毫秒），每次最多推进一个任务
    pub processing_interval_ms: u64,
    /// 超时看门狗扫描间隔（毫秒）
    pub timeout_check_interval_ms: u64,
    /// 保留的终态任务数量上限，超出后按完成顺序淘汰最旧的记录
    pub max_task_history: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            processing_interval_ms: 100,
            timeout_check_interval_ms: 50,
            max_task_history: 10_000,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing_interval_ms == 0 {
            return Err(anyhow::anyhow!("派发间隔必须大于0"));
        }

        if self.timeout_check_interval_ms == 0 {
            return Err(anyhow::anyhow!("超时检查间隔必须大于0"));
        }

        if self.max_task_history == 0 {
            return Err(anyhow::anyhow!("任务历史保留数量必须大于0"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// 未显式指定时每个 Provider 的连接上限
    pub default_pool_size: usize,
    pub health_check_interval_seconds: u64,
    /// 连接池满时的最长等待时间，None 表示一直等待
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_pool_size: 1,
            health_check_interval_seconds: 30,
            acquire_timeout_ms: None,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_pool_size == 0 {
            return Err(anyhow::anyhow!("默认连接池大小必须大于0"));
        }

        if self.health_check_interval_seconds == 0 {
            return Err(anyhow::anyhow!("健康检查间隔必须大于0"));
        }

        if self.acquire_timeout_ms == Some(0) {
            return Err(anyhow::anyhow!("获取连接超时时间必须大于0"));
        }

        Ok(())
    }

    /// 为单个 Provider 生成配置，未指定的字段使用全局默认值
    pub fn provider(&self, provider_id: impl Into<String>) -> ProviderPoolConfig {
        ProviderPoolConfig {
            provider_id: provider_id.into(),
            pool_size: Some(self.default_pool_size),
            health_check_interval_seconds: Some(self.health_check_interval_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderPoolConfig {
    pub provider_id: String,
    #[serde(default)]
    pub pool_size: Option<usize>,
    #[serde(default)]
    pub health_check_interval_seconds: Option<u64>,
}

impl ProviderPoolConfig {
    pub fn new(provider_id: impl Into<String>, pool_size: usize) -> Self {
        Self {
            provider_id: provider_id.into(),
            pool_size: Some(pool_size),
            health_check_interval_seconds: None,
        }
    }

    pub fn with_health_check_interval(mut self, seconds: u64) -> Self {
        self.health_check_interval_seconds = Some(seconds);
        self
    }

    /// 未配置时连接池大小为 1
    pub fn effective_pool_size(&self) -> usize {
        self.pool_size.unwrap_or(1)
    }

    pub fn effective_health_check_interval(&self, defaults: &PoolConfig) -> u64 {
        self.health_check_interval_seconds
            .unwrap_or(defaults.health_check_interval_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider_id.trim().is_empty() {
            return Err(anyhow::anyhow!("Provider ID不能为空"));
        }

        if self.pool_size == Some(0) {
            return Err(anyhow::anyhow!(
                "Provider {} 的连接池大小必须大于0",
                self.provider_id
            ));
        }

        if self.health_check_interval_seconds == Some(0) {
            return Err(anyhow::anyhow!(
                "Provider {} 的健康检查间隔必须大于0",
                self.provider_id
            ));
        }

        Ok(())
    }
}
