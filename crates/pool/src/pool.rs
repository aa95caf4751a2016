use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use modelhub_core::{
    same_connection, ConnectionFactory, ConnectionHealth, ConnectionState, PoolEvent,
    ProviderHealth, SharedConnection,
};
use modelhub_errors::{HubError, HubResult};
use modelhub_observability::{MetricsCollector, StructuredLogger};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::time::Instant;
use tracing::{debug, warn};

/// 连接池统计信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub provider_id: String,
    pub total_connections: usize,
    pub active_connections: usize,
    pub idle_connections: usize,
    pub waiting_acquirers: usize,
    pub max_size: usize,
    pub created_count: usize,
    pub reused_count: usize,
    pub hit_rate: f64,
}

struct PooledConnection {
    connection: SharedConnection,
    is_active: bool,
    created_at: DateTime<Utc>,
    last_used: DateTime<Utc>,
}

impl PooledConnection {
    fn active(connection: SharedConnection) -> Self {
        let now = Utc::now();
        Self {
            connection,
            is_active: true,
            created_at: now,
            last_used: now,
        }
    }
}

/// 转交途中的连接；等待者被取消、没有取走连接时归还给池
struct Handoff {
    connection: SharedConnection,
    state: Arc<Mutex<PoolState>>,
    armed: bool,
}

impl Handoff {
    fn accept(mut self) -> SharedConnection {
        self.armed = false;
        Arc::clone(&self.connection)
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let connection = Arc::clone(&self.connection);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut guard = state.lock().await;
            if guard.return_connection(&connection, &state).is_some() {
                debug!("等待者已取消，转交中的连接已归还");
            }
        });
    }
}

/// 等待者收到 [`Handoff`] 即获得连接；发送端被直接丢弃表示需要重新走获取流程
type Waiter = oneshot::Sender<Handoff>;

#[derive(Default)]
struct PoolState {
    connections: Vec<PooledConnection>,
    waiters: VecDeque<Waiter>,
    /// 正在由工厂创建、尚未入池的连接数
    creating: usize,
    closed: bool,
    created_count: usize,
    reused_count: usize,
}

impl PoolState {
    /// 交给最早的存活等待者；没有等待者时原样返回连接
    fn hand_off(
        &mut self,
        connection: SharedConnection,
        pool_state: &Arc<Mutex<PoolState>>,
    ) -> Option<SharedConnection> {
        let mut connection = connection;
        while let Some(waiter) = self.waiters.pop_front() {
            let handoff = Handoff {
                connection,
                state: Arc::clone(pool_state),
                armed: true,
            };
            match waiter.send(handoff) {
                Ok(()) => {
                    self.reused_count += 1;
                    return None;
                }
                Err(returned) => connection = returned.accept(),
            }
        }
        Some(connection)
    }

    /// 归还借出的连接；连接不属于本池、已空闲或池已关闭时返回 None，
    /// 否则返回是否直接转交给了等待者
    fn return_connection(
        &mut self,
        connection: &SharedConnection,
        pool_state: &Arc<Mutex<PoolState>>,
    ) -> Option<bool> {
        if self.closed {
            return None;
        }

        let index = self
            .connections
            .iter()
            .position(|c| same_connection(&c.connection, connection))?;
        let pooled = &mut self.connections[index];
        if !pooled.is_active {
            return None;
        }
        pooled.last_used = Utc::now();
        let shared = Arc::clone(&pooled.connection);

        let handed_off = self.hand_off(shared, pool_state).is_none();
        if !handed_off {
            self.connections[index].is_active = false;
        }
        Some(handed_off)
    }

    /// 丢弃最早的存活等待者的发送端，让它重新尝试获取
    fn wake_one_for_retry(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            if !waiter.is_closed() {
                return;
            }
        }
    }

    fn active_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_active).count()
    }
}

/// 占用一个创建名额；获取流程在创建途中被取消时归还名额
struct CreationSlot {
    state: Arc<Mutex<PoolState>>,
    armed: bool,
}

impl CreationSlot {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CreationSlot {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let mut state = state.lock().await;
            state.creating = state.creating.saturating_sub(1);
            state.wake_one_for_retry();
        });
    }
}

/// Bounded pool of connections for one provider.
///
/// Connections are created lazily up to `max_size`. When the pool is
/// saturated, acquirers queue in FIFO order and a released connection is
/// handed straight to the oldest one.
pub struct ConnectionPool {
    provider_id: String,
    max_size: usize,
    factory: Arc<dyn ConnectionFactory>,
    state: Arc<Mutex<PoolState>>,
    events: broadcast::Sender<PoolEvent>,
    metrics: Arc<MetricsCollector>,
}

impl ConnectionPool {
    pub fn new(
        provider_id: impl Into<String>,
        max_size: usize,
        factory: Arc<dyn ConnectionFactory>,
        events: broadcast::Sender<PoolEvent>,
        metrics: Arc<MetricsCollector>,
    ) -> HubResult<Self> {
        let provider_id = provider_id.into();
        if max_size == 0 {
            return Err(HubError::validation_error(format!(
                "Provider {} 的连接池大小必须大于0",
                provider_id
            )));
        }

        Ok(Self {
            provider_id,
            max_size,
            factory,
            state: Arc::new(Mutex::new(PoolState::default())),
            events,
            metrics,
        })
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn emit(&self, event: PoolEvent) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.events.send(event);
    }

    /// Acquire a connection, waiting up to `timeout` when the pool is full.
    ///
    /// `None` waits until a connection is released or the pool is disposed.
    /// Dropping the returned future while it waits never leaks a connection.
    pub async fn acquire(&self, timeout: Option<Duration>) -> HubResult<SharedConnection> {
        let started = Instant::now();

        loop {
            let waiter = {
                let mut guard = self.state.lock().await;
                let state = &mut *guard;
                if state.closed {
                    return Err(HubError::pool_closed(&self.provider_id));
                }

                if let Some(pooled) = state.connections.iter_mut().find(|c| !c.is_active) {
                    pooled.is_active = true;
                    pooled.last_used = Utc::now();
                    state.reused_count += 1;
                    let connection = Arc::clone(&pooled.connection);
                    self.record_acquired(state, started);
                    return Ok(connection);
                }

                if state.connections.len() + state.creating < self.max_size {
                    state.creating += 1;
                    None
                } else {
                    // 超时或取消的等待者留下的发送端
                    state.waiters.retain(|w| !w.is_closed());
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    debug!(
                        "Provider {} 连接池已满，排队等待（前方 {} 个）",
                        self.provider_id,
                        state.waiters.len() - 1
                    );
                    Some(rx)
                }
            };

            let Some(rx) = waiter else {
                let slot = CreationSlot {
                    state: Arc::clone(&self.state),
                    armed: true,
                };
                return self.create_connection(slot, started).await;
            };

            let received = match timeout {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    match tokio::time::timeout(remaining, rx).await {
                        Ok(received) => received,
                        Err(_) => {
                            self.metrics.record_acquire_timeout(&self.provider_id);
                            return Err(HubError::AcquireTimeout {
                                provider_id: self.provider_id.clone(),
                                timeout_ms: limit.as_millis() as u64,
                            });
                        }
                    }
                }
                None => rx.await,
            };

            match received {
                Ok(handoff) => {
                    let connection = handoff.accept();
                    self.metrics.record_connection_acquired(
                        &self.provider_id,
                        started.elapsed().as_secs_f64(),
                    );
                    return Ok(connection);
                }
                // 名额空出或池已关闭，回到循环开头重新判断
                Err(_) => continue,
            }
        }
    }

    fn record_acquired(&self, state: &PoolState, started: Instant) {
        self.metrics
            .record_connection_acquired(&self.provider_id, started.elapsed().as_secs_f64());
        self.metrics
            .update_pool_size(&self.provider_id, state.active_count(), state.connections.len());
    }

    async fn create_connection(
        &self,
        slot: CreationSlot,
        started: Instant,
    ) -> HubResult<SharedConnection> {
        let result = self.factory.create_connection().await;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.creating = state.creating.saturating_sub(1);
        slot.disarm();

        match result {
            Ok(connection) => {
                if state.closed {
                    drop(guard);
                    if let Err(e) = connection.disconnect().await {
                        warn!("连接池已关闭，丢弃新建连接时断开失败: {}", e);
                    }
                    return Err(HubError::pool_closed(&self.provider_id));
                }

                state
                    .connections
                    .push(PooledConnection::active(Arc::clone(&connection)));
                state.created_count += 1;

                StructuredLogger::log_connection_created(
                    &self.provider_id,
                    state.connections.len(),
                    self.max_size,
                );
                self.metrics.record_connection_created(&self.provider_id);
                self.record_acquired(state, started);
                self.emit(PoolEvent::state_changed(
                    &self.provider_id,
                    ConnectionState::Connected,
                ));
                Ok(connection)
            }
            Err(e) => {
                state.wake_one_for_retry();
                drop(guard);

                warn!("Provider {} 创建连接失败: {}", self.provider_id, e);
                self.emit(PoolEvent::state_changed(
                    &self.provider_id,
                    ConnectionState::Error(e.to_string()),
                ));
                Err(e)
            }
        }
    }

    /// 归还连接；未知或已空闲的连接静默忽略
    pub async fn release(&self, connection: &SharedConnection) {
        let mut guard = self.state.lock().await;
        let Some(handed_off) = guard.return_connection(connection, &self.state) else {
            debug!("Provider {} 忽略无效的连接归还", self.provider_id);
            return;
        };

        StructuredLogger::log_connection_released(&self.provider_id, handed_off);
        self.metrics
            .update_pool_size(&self.provider_id, guard.active_count(), guard.connections.len());
    }

    /// 并发探测所有连接，单个探测出错只记为不健康
    pub async fn health_check(&self) -> ProviderHealth {
        let connections: Vec<SharedConnection> = {
            let state = self.state.lock().await;
            state
                .connections
                .iter()
                .map(|c| Arc::clone(&c.connection))
                .collect()
        };

        let probes = connections
            .into_iter()
            .enumerate()
            .map(|(index, connection)| async move {
                let started = Instant::now();
                let outcome = connection.health_check().await;
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                match outcome {
                    Ok(true) => ConnectionHealth::healthy(index, latency_ms),
                    Ok(false) => ConnectionHealth::unhealthy(index, Some(latency_ms), None),
                    Err(e) => {
                        ConnectionHealth::unhealthy(index, Some(latency_ms), Some(e.to_string()))
                    }
                }
            });

        let health = ProviderHealth::aggregate(join_all(probes).await);

        StructuredLogger::log_health_check(
            &self.provider_id,
            health.is_healthy,
            health.healthy_count(),
            health.connections.len(),
            health.average_latency_ms,
        );
        self.metrics.record_health_check(
            &self.provider_id,
            health.is_healthy,
            health.average_latency_ms,
        );
        self.emit(PoolEvent::health_check(&self.provider_id, health.clone()));

        health
    }

    pub async fn stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let active = state.active_count();
        let total_requests = state.created_count + state.reused_count;

        PoolStats {
            provider_id: self.provider_id.clone(),
            total_connections: state.connections.len(),
            active_connections: active,
            idle_connections: state.connections.len() - active,
            waiting_acquirers: state.waiters.iter().filter(|w| !w.is_closed()).count(),
            max_size: self.max_size,
            created_count: state.created_count,
            reused_count: state.reused_count,
            hit_rate: if total_requests > 0 {
                state.reused_count as f64 / total_requests as f64
            } else {
                0.0
            },
        }
    }

    /// 最久未使用的空闲连接的空闲时长
    pub async fn longest_idle(&self) -> Option<chrono::Duration> {
        let state = self.state.lock().await;
        let now = Utc::now();
        state
            .connections
            .iter()
            .filter(|c| !c.is_active)
            .map(|c| now - c.last_used)
            .max()
    }

    pub async fn oldest_connection_age(&self) -> Option<chrono::Duration> {
        let state = self.state.lock().await;
        let now = Utc::now();
        state.connections.iter().map(|c| now - c.created_at).max()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Close the pool and disconnect every connection.
    ///
    /// Disconnect failures are logged and do not stop the rest. Waiting
    /// acquirers fail with `PoolClosed`. Calling this twice is a no-op.
    pub async fn dispose(&self) {
        let (connections, waiters) = {
            let mut state = self.state.lock().await;
            if state.closed {
                return;
            }
            state.closed = true;
            (
                std::mem::take(&mut state.connections),
                std::mem::take(&mut state.waiters),
            )
        };
        drop(waiters);

        let total = connections.len();
        let results = join_all(
            connections
                .iter()
                .map(|pooled| pooled.connection.disconnect()),
        )
        .await;

        let mut failed = 0;
        for (index, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                failed += 1;
                warn!(
                    "Provider {} 的连接 {} 断开失败: {}",
                    self.provider_id, index, e
                );
            }
        }

        self.metrics.update_pool_size(&self.provider_id, 0, 0);
        self.emit(PoolEvent::state_changed(
            &self.provider_id,
            ConnectionState::Disconnected,
        ));
        StructuredLogger::log_pool_disposed(&self.provider_id, total, failed);
    }
}
