use std::collections::HashSet;
use std::path::Path;

use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::{
    observability::ObservabilityConfig,
    scheduler_pool::{PoolConfig, ProviderPoolConfig, SchedulerConfig},
};

/// 默认配置文件搜索路径
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/modelhub.toml",
    "modelhub.toml",
    "/etc/modelhub/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// 启动时注册内置后端的模型ID
    pub models: Vec<String>,
    pub scheduler: SchedulerConfig,
    pub pool: PoolConfig,
    /// 启动时初始化的 Provider 连接池
    pub providers: Vec<ProviderPoolConfig>,
    pub observability: ObservabilityConfig,
}

impl HubConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default values
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: MODELHUB_, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("MODELHUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: HubConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: HubConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;

        self.pool.validate().context("连接池配置验证失败")?;

        let mut seen = HashSet::new();
        for provider in &self.providers {
            provider.validate().context("Provider配置验证失败")?;
            if !seen.insert(provider.provider_id.as_str()) {
                return Err(anyhow::anyhow!(
                    "Provider ID重复: {}",
                    provider.provider_id
                ));
            }
        }

        if self.models.iter().any(|m| m.trim().is_empty()) {
            return Err(anyhow::anyhow!("模型ID不能为空"));
        }

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
models = ["llama3", "gpt-4o"]

[scheduler]
processing_interval_ms = 20
timeout_check_interval_ms = 10

[pool]
default_pool_size = 2
acquire_timeout_ms = 5000

[[providers]]
provider_id = "ollama"
pool_size = 3

[[providers]]
provider_id = "openai"
health_check_interval_seconds = 10

[observability]
log_level = "debug"
log_format = "json"
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = HubConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.providers.is_empty());
        assert_eq!(config.scheduler.processing_interval_ms, 100);
    }

    #[test]
    fn test_from_toml() {
        let config = HubConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.scheduler.processing_interval_ms, 20);
        assert_eq!(config.scheduler.max_task_history, 10_000);
        assert_eq!(config.pool.default_pool_size, 2);
        assert_eq!(config.pool.acquire_timeout_ms, Some(5000));
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[0].effective_pool_size(), 3);
        assert_eq!(config.providers[1].pool_size, None);
        assert_eq!(config.models, vec!["llama3", "gpt-4o"]);
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let config = HubConfig::from_toml(SAMPLE).unwrap();
        let rendered = config.to_toml().unwrap();
        let reparsed = HubConfig::from_toml(&rendered).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let toml_str = r#"
[[providers]]
provider_id = "ollama"

[[providers]]
provider_id = "ollama"
"#;
        let err = HubConfig::from_toml(toml_str).unwrap_err();
        assert!(format!("{err:#}").contains("Provider ID重复"));
    }

    #[test]
    fn test_invalid_pool_size_rejected() {
        let toml_str = r#"
[[providers]]
provider_id = "ollama"
pool_size = 0
"#;
        assert!(HubConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = HubConfig::load(Some(&path)).unwrap();
        assert_eq!(config.scheduler.timeout_check_interval_ms, 10);
        assert_eq!(config.providers[0].provider_id, "ollama");
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = HubConfig::load(Some("/nonexistent/modelhub.toml"));
        assert!(result.is_err());
    }
}
