//! 配置管理
//!
//! 配置按以下顺序合并，后者覆盖前者：
//! 1. 结构体默认值
//! 2. TOML 配置文件（显式路径或默认搜索路径）
//! 3. `MODELHUB_` 前缀的环境变量，嵌套字段用 `__` 分隔，
//!    例如 `MODELHUB_SCHEDULER__PROCESSING_INTERVAL_MS=50`
//!
//! 合并完成后统一调用 `validate()`。

pub mod models;

pub use models::*;
