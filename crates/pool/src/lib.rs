//! Provider 连接池
//!
//! - [`ConnectionPool`]: 单个 Provider 的有界连接池，满载时按 FIFO 排队等待归还
//! - [`ConnectionPoolManager`]: 按 Provider ID 管理连接池、周期健康检查与事件广播

pub mod manager;
pub mod pool;

pub use manager::ConnectionPoolManager;
pub use pool::{ConnectionPool, PoolStats};
