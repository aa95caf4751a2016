//! 配置数据模型
//!
//! - **app_config**: 顶层配置与加载逻辑
//! - **scheduler_pool**: 调度器与连接池参数
//! - **observability**: 日志与指标参数

pub mod app_config;
pub mod observability;
pub mod scheduler_pool;

pub use app_config::{HubConfig, DEFAULT_CONFIG_PATHS};
pub use observability::ObservabilityConfig;
pub use scheduler_pool::{PoolConfig, ProviderPoolConfig, SchedulerConfig};
