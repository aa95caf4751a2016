use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use modelhub_core::{
    ConnectionFactory, PoolConfig, PoolEvent, ProviderHealth, ProviderPoolConfig,
    SharedConnection,
};
use modelhub_errors::{HubError, HubResult};
use modelhub_observability::MetricsCollector;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::pool::{ConnectionPool, PoolStats};

const EVENT_CHANNEL_CAPACITY: usize = 256;

struct ProviderEntry {
    pool: Arc<ConnectionPool>,
    shutdown_tx: broadcast::Sender<()>,
    health_task: JoinHandle<()>,
}

impl ProviderEntry {
    async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.health_task.await {
            warn!("Provider {} 健康检查任务异常退出: {}", self.pool.provider_id(), e);
        }
        self.pool.dispose().await;
    }
}

/// Owns one [`ConnectionPool`] per provider plus its health-check loop, and
/// fans pool events out to subscribers.
pub struct ConnectionPoolManager {
    config: PoolConfig,
    providers: RwLock<HashMap<String, ProviderEntry>>,
    events: RwLock<Option<broadcast::Sender<PoolEvent>>>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionPoolManager {
    pub fn new(config: PoolConfig) -> HubResult<Self> {
        let metrics = MetricsCollector::new()
            .map_err(|e| HubError::Internal(format!("初始化指标采集器失败: {e}")))?;
        Self::with_metrics(config, Arc::new(metrics))
    }

    pub fn with_metrics(config: PoolConfig, metrics: Arc<MetricsCollector>) -> HubResult<Self> {
        config
            .validate()
            .map_err(|e| HubError::config_error(format!("连接池配置无效: {e}")))?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            providers: RwLock::new(HashMap::new()),
            events: RwLock::new(Some(events)),
            metrics,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// 订阅连接池事件；管理器释放后返回的接收端立即关闭
    pub async fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        match self.events.read().await.as_ref() {
            Some(sender) => sender.subscribe(),
            None => broadcast::channel(1).1,
        }
    }

    /// Create the pool for `provider_id` and start its health-check loop.
    ///
    /// An existing pool under the same id is replaced and disposed.
    pub async fn initialize_provider(
        &self,
        provider: ProviderPoolConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> HubResult<()> {
        provider
            .validate()
            .map_err(|e| HubError::config_error(e.to_string()))?;

        let events = self
            .events
            .read()
            .await
            .clone()
            .ok_or_else(|| HubError::Internal("连接池管理器已释放".to_string()))?;

        let pool = Arc::new(ConnectionPool::new(
            provider.provider_id.clone(),
            provider.effective_pool_size(),
            factory,
            events,
            Arc::clone(&self.metrics),
        )?);

        let check_interval = provider.effective_health_check_interval(&self.config);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let health_task = Self::spawn_health_loop(
            Arc::clone(&pool),
            Duration::from_secs(check_interval),
            shutdown_rx,
        );

        let previous = self.providers.write().await.insert(
            provider.provider_id.clone(),
            ProviderEntry {
                pool,
                shutdown_tx,
                health_task,
            },
        );

        if let Some(previous) = previous {
            info!("Provider {} 重新初始化，释放旧连接池", provider.provider_id);
            previous.shutdown().await;
        }

        info!(
            "Provider {} 连接池已初始化，容量 {}，健康检查间隔 {}s",
            provider.provider_id,
            provider.effective_pool_size(),
            check_interval
        );
        Ok(())
    }

    fn spawn_health_loop(
        pool: Arc<ConnectionPool>,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // 第一次 tick 立即返回，初始化时不做检查
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pool.health_check().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Provider {} 健康检查循环退出", pool.provider_id());
                        break;
                    }
                }
            }
        })
    }

    async fn pool(&self, provider_id: &str) -> Option<Arc<ConnectionPool>> {
        self.providers
            .read()
            .await
            .get(provider_id)
            .map(|entry| Arc::clone(&entry.pool))
    }

    /// 获取连接；配置了 `acquire_timeout_ms` 时等待超时返回错误
    pub async fn acquire_connection(&self, provider_id: &str) -> HubResult<SharedConnection> {
        let pool = self
            .pool(provider_id)
            .await
            .ok_or_else(|| HubError::provider_not_initialized(provider_id))?;

        let timeout = self.config.acquire_timeout_ms.map(Duration::from_millis);
        pool.acquire(timeout).await
    }

    pub async fn release_connection(&self, provider_id: &str, connection: &SharedConnection) {
        match self.pool(provider_id).await {
            Some(pool) => pool.release(connection).await,
            None => debug!("Provider {} 未初始化，忽略连接归还", provider_id),
        }
    }

    pub async fn check_provider_health(&self, provider_id: &str) -> HubResult<ProviderHealth> {
        let pool = self
            .pool(provider_id)
            .await
            .ok_or_else(|| HubError::provider_not_initialized(provider_id))?;
        Ok(pool.health_check().await)
    }

    pub async fn pool_stats(&self, provider_id: &str) -> Option<PoolStats> {
        let pool = self.pool(provider_id).await?;
        Some(pool.stats().await)
    }

    pub async fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 停止健康检查并释放连接池；返回该 Provider 是否存在
    pub async fn dispose_provider(&self, provider_id: &str) -> bool {
        let entry = self.providers.write().await.remove(provider_id);
        match entry {
            Some(entry) => {
                entry.shutdown().await;
                info!("Provider {} 连接池已释放", provider_id);
                true
            }
            None => false,
        }
    }

    /// 释放全部连接池并关闭事件通道
    pub async fn dispose(&self) {
        let entries: Vec<ProviderEntry> = {
            let mut providers = self.providers.write().await;
            providers.drain().map(|(_, entry)| entry).collect()
        };

        let count = entries.len();
        for entry in entries {
            entry.shutdown().await;
        }

        self.events.write().await.take();
        info!("连接池管理器已释放 {} 个 Provider", count);
    }
}
