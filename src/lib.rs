//! # modelhub
//!
//! 在多个模型后端之间按优先级调度调用，并为每个 Provider 维护有界连接池。
//!
//! [`Coordinator`] 把调度器、后端注册表与连接池管理器组装在一起，
//! 由调用方显式持有，不使用全局单例。

pub mod app;
pub mod builtin;
pub mod shutdown;

pub use app::Coordinator;
pub use builtin::{EchoModelSystem, LocalConnection, LocalConnectionFactory};
pub use shutdown::ShutdownManager;

pub use modelhub_core::{
    HubConfig, HubError, HubResult, ModelSystem, ModelSystemStatus, PoolEvent, ProviderHealth,
    ProviderPoolConfig, ScheduledTask, SchedulerMetrics, TaskFailure, TaskId, TaskPriority,
    TaskStatus,
};
pub use modelhub_pool::{ConnectionPoolManager, PoolStats};
pub use modelhub_scheduler::TaskScheduler;
