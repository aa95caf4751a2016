//! 内置的本地后端与连接实现
//!
//! 二进制在没有真实 Provider 时用它们跑通完整链路：
//! 每个配置的模型注册一个 [`EchoModelSystem`]，每个 Provider 用
//! [`LocalConnectionFactory`] 建池。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use modelhub_core::{
    ConnectionFactory, ModelSystem, ModelSystemStatus, ProviderConnection, SharedConnection,
};
use modelhub_errors::{HubError, HubResult};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 原样返回载荷的后端，可选模拟处理延迟
pub struct EchoModelSystem {
    name: String,
    latency: Option<Duration>,
    max_concurrency: usize,
    in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl EchoModelSystem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            latency: None,
            max_concurrency: 1,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 同时执行的任务数达到上限后报告忙碌
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelSystem for EchoModelSystem {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute_task(&self, payload: &Value, cancel: CancellationToken) -> HubResult<Value> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        if let Some(latency) = self.latency {
            tokio::select! {
                _ = tokio::time::sleep(latency) => {}
                _ = cancel.cancelled() => {
                    debug!("模型 {} 的调用被取消", self.name);
                    return Err(HubError::Cancelled(format!("模型 {} 的调用已取消", self.name)));
                }
            }
        }

        Ok(json!({
            "model": self.name,
            "output": payload,
        }))
    }

    async fn get_status(&self) -> ModelSystemStatus {
        if self.in_flight() >= self.max_concurrency {
            ModelSystemStatus::busy()
        } else {
            ModelSystemStatus::idle()
        }
    }
}

/// 不做任何 I/O 的本地连接，断开后健康检查返回 false
pub struct LocalConnection {
    id: usize,
    closed: AtomicBool,
}

impl LocalConnection {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderConnection for LocalConnection {
    async fn health_check(&self) -> HubResult<bool> {
        Ok(!self.is_closed())
    }

    async fn disconnect(&self) -> HubResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(HubError::connection_error(format!(
                "本地连接 {} 已断开",
                self.id
            )));
        }
        Ok(())
    }
}

pub struct LocalConnectionFactory {
    provider_id: String,
    next_id: AtomicUsize,
}

impl LocalConnectionFactory {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn created(&self) -> usize {
        self.next_id.load(Ordering::SeqCst) - 1
    }
}

#[async_trait]
impl ConnectionFactory for LocalConnectionFactory {
    async fn create_connection(&self) -> HubResult<SharedConnection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!("Provider {} 创建本地连接 {}", self.provider_id, id);
        Ok(Arc::new(LocalConnection {
            id,
            closed: AtomicBool::new(false),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_returns_payload() {
        let system = EchoModelSystem::new("echo");
        let result = system
            .execute_task(&json!("hello"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result["model"], "echo");
        assert_eq!(result["output"], "hello");
        assert_eq!(system.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_echo_reports_busy_while_executing() {
        let system = Arc::new(EchoModelSystem::new("slow").with_latency(Duration::from_millis(100)));
        assert!(system.get_status().await.can_accept());

        let running = Arc::clone(&system);
        let handle = tokio::spawn(async move {
            running
                .execute_task(&Value::Null, CancellationToken::new())
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(system.get_status().await.busy);

        assert!(handle.await.unwrap().is_ok());
        assert!(system.get_status().await.can_accept());
    }

    #[tokio::test]
    async fn test_echo_honours_cancellation() {
        let system = EchoModelSystem::new("slow").with_latency(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = system.execute_task(&Value::Null, cancel).await;
        assert!(matches!(result, Err(HubError::Cancelled(_))));
        assert_eq!(system.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_local_connection_lifecycle() {
        let factory = LocalConnectionFactory::new("local");
        let connection = factory.create_connection().await.unwrap();
        let _second = factory.create_connection().await.unwrap();
        assert_eq!(factory.created(), 2);

        assert!(connection.health_check().await.unwrap());
        connection.disconnect().await.unwrap();
        assert!(!connection.health_check().await.unwrap());
        assert!(connection.disconnect().await.is_err());
    }
}
