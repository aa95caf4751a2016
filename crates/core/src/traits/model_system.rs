//! 模型执行后端接口
//!
//! 调度器不关心后端是本地子进程、HTTP 调用还是内存中的桩实现，
//! 只依赖这里定义的两个 trait：
//! - [`ModelSystem`] 负责真正执行任务并报告自身忙闲状态
//! - [`SystemManager`] 负责按模型 ID 查找后端
//!
//! ## 实现自定义后端
//!
//! ```rust
//! use async_trait::async_trait;
//! use modelhub_core::traits::{ModelSystem, ModelSystemStatus};
//! use modelhub_core::HubResult;
//! use tokio_util::sync::CancellationToken;
//!
//! pub struct UppercaseSystem;
//!
//! #[async_trait]
//! impl ModelSystem for UppercaseSystem {
//!     fn name(&self) -> &str {
//!         "uppercase"
//!     }
//!
//!     async fn execute_task(
//!         &self,
//!         payload: &serde_json::Value,
//!         _cancel: CancellationToken,
//!     ) -> HubResult<serde_json::Value> {
//!         let text = payload.as_str().unwrap_or_default();
//!         Ok(serde_json::json!(text.to_uppercase()))
//!     }
//!
//!     async fn get_status(&self) -> ModelSystemStatus {
//!         ModelSystemStatus::idle()
//!     }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::HubResult;

/// 后端忙闲状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSystemStatus {
    /// 为 false 时派发到该后端的任务直接失败
    pub available: bool,
    /// 为 true 时调度器在本轮跳过该模型
    pub busy: bool,
}

impl ModelSystemStatus {
    pub fn idle() -> Self {
        Self {
            available: true,
            busy: false,
        }
    }

    pub fn busy() -> Self {
        Self {
            available: true,
            busy: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            busy: false,
        }
    }

    pub fn can_accept(&self) -> bool {
        self.available && !self.busy
    }
}

/// 模型执行后端
///
/// `cancel` 在任务被超时看门狗判定失败后触发。后端可以监听它提前放弃工作，
/// 也可以忽略；调度器不会中止正在进行的调用，只更新任务记录。
#[async_trait]
pub trait ModelSystem: Send + Sync {
    fn name(&self) -> &str;

    async fn execute_task(
        &self,
        payload: &serde_json::Value,
        cancel: CancellationToken,
    ) -> HubResult<serde_json::Value>;

    async fn get_status(&self) -> ModelSystemStatus;
}

/// 按模型 ID 解析执行后端
#[async_trait]
pub trait SystemManager: Send + Sync {
    async fn get_system(&self, model_id: &str) -> Option<Arc<dyn ModelSystem>>;
}
