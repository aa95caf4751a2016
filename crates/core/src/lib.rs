//! # modelhub-core
//!
//! 模型调度与 Provider 连接池共享的基础层：
//! - **models**: 任务、指标、健康检查与事件模型
//! - **traits**: 执行后端、连接工厂与调度服务接口
//! - **system_registry**: 按模型ID查找执行后端的内存注册表
//! - **config**: 分层配置加载与校验

pub mod config;
pub mod models;
pub mod system_registry;
pub mod traits;

pub use crate::config::{
    HubConfig, ObservabilityConfig, PoolConfig, ProviderPoolConfig, SchedulerConfig,
};
pub use models::{
    ConnectionHealth, ConnectionState, PoolEvent, ProviderHealth, ScheduledTask,
    SchedulerMetrics, TaskFailure, TaskId, TaskPriority, TaskStatus,
};
pub use modelhub_errors::{HubError, HubResult};
pub use system_registry::ModelSystemRegistry;
pub use traits::{
    same_connection, ConnectionFactory, ModelSystem, ModelSystemStatus, ProviderConnection,
    SharedConnection, SystemManager, TaskSchedulingService,
};
