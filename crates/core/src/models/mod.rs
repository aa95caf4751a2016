//! # 数据模型
//!
//! 调度器与连接池共享的核心数据结构。
//!
//! ## 核心模型
//!
//! ### ScheduledTask - 调度任务
//! 针对某个模型后端的一次调用，带有优先级、超时与时间戳，用于计算排队与处理耗时。
//!
//! ### SchedulerMetrics - 调度指标
//! 调度器实例级别的聚合计数与平均耗时。
//!
//! ### ProviderHealth - 健康汇总
//! 连接池定期探测每个连接后得到的汇总结果。
//!
//! ### PoolEvent - 连接池事件
//! 健康检查结果与连接状态变化，通过广播通道推送给订阅者。
//!
//! 所有时间字段使用 `DateTime<Utc>`，所有模型都实现了 serde 序列化。

pub mod events;
pub mod health;
pub mod metrics;
pub mod task;

pub use events::{ConnectionState, PoolEvent};
pub use health::{ConnectionHealth, ProviderHealth};
pub use metrics::SchedulerMetrics;
pub use task::{ScheduledTask, TaskFailure, TaskId, TaskPriority, TaskStatus};
