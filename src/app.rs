use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use modelhub_core::{
    ConnectionFactory, HubConfig, ModelSystem, ModelSystemRegistry, ProviderPoolConfig,
    ScheduledTask, SystemManager, TaskFailure, TaskId, TaskPriority, TaskStatus,
};
use modelhub_errors::{HubError, HubResult};
use modelhub_observability::MetricsCollector;
use modelhub_pool::ConnectionPoolManager;
use modelhub_scheduler::TaskScheduler;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::{interval, sleep, Instant};
use tracing::{debug, info, warn};

/// 状态汇报周期
const STATUS_REPORT_INTERVAL: Duration = Duration::from_secs(30);

/// 组装调度器、后端注册表与连接池管理器
///
/// 由调用方创建并持有，测试中可以同时存在多个互不影响的实例。
pub struct Coordinator {
    config: HubConfig,
    registry: Arc<ModelSystemRegistry>,
    scheduler: Arc<TaskScheduler>,
    pools: Arc<ConnectionPoolManager>,
    metrics: Arc<MetricsCollector>,
}

impl Coordinator {
    pub fn new(config: HubConfig) -> Result<Self> {
        config.validate().context("配置校验失败")?;

        let metrics = Arc::new(MetricsCollector::new().context("创建指标收集器失败")?);
        let registry = Arc::new(ModelSystemRegistry::new());
        let system_manager: Arc<dyn SystemManager> = registry.clone();

        let scheduler = Arc::new(
            TaskScheduler::with_metrics(
                config.scheduler.clone(),
                system_manager,
                Arc::clone(&metrics),
            )
            .context("创建任务调度器失败")?,
        );
        let pools = Arc::new(
            ConnectionPoolManager::with_metrics(config.pool.clone(), Arc::clone(&metrics))
                .context("创建连接池管理器失败")?,
        );

        Ok(Self {
            config,
            registry,
            scheduler,
            pools,
            metrics,
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ModelSystemRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn pools(&self) -> &Arc<ConnectionPoolManager> {
        &self.pools
    }

    /// 启动调度器后台循环
    pub async fn start(&self) -> HubResult<()> {
        self.scheduler.start().await
    }

    pub async fn register_model_system(
        &self,
        model_id: impl Into<String>,
        system: Arc<dyn ModelSystem>,
    ) {
        self.registry.register(model_id, system).await;
    }

    pub async fn initialize_provider(
        &self,
        provider: ProviderPoolConfig,
        factory: Arc<dyn ConnectionFactory>,
    ) -> HubResult<()> {
        self.pools.initialize_provider(provider, factory).await
    }

    pub async fn submit(
        &self,
        model_id: &str,
        priority: TaskPriority,
        payload: Value,
        timeout_ms: Option<u64>,
    ) -> TaskId {
        self.scheduler
            .schedule_task(model_id, priority, payload, timeout_ms)
            .await
    }

    /// 轮询直到任务进入终态，把失败原因映射为 [`HubError`]
    ///
    /// `wait_limit` 只限制本次等待，不影响任务本身。
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        wait_limit: Option<Duration>,
    ) -> HubResult<Value> {
        let poll = Duration::from_millis(self.config.scheduler.processing_interval_ms);
        let deadline = wait_limit.map(|limit| Instant::now() + limit);

        loop {
            let task = self
                .scheduler
                .get_task_status(task_id)
                .await
                .ok_or_else(|| HubError::validation_error(format!("任务不存在: {task_id}")))?;

            if task.status.is_terminal() {
                return task_outcome(task);
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(HubError::timeout_error(format!(
                        "等待任务 {task_id} 结果超时"
                    )));
                }
            }
            sleep(poll).await;
        }
    }

    /// 提交任务并等待结果
    pub async fn run_task(
        &self,
        model_id: &str,
        priority: TaskPriority,
        payload: Value,
        timeout_ms: Option<u64>,
    ) -> HubResult<Value> {
        let task_id = self.submit(model_id, priority, payload, timeout_ms).await;
        self.wait_for_task(&task_id, None).await
    }

    /// 启动调度器并周期性汇报状态，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.start().await.context("启动调度器失败")?;
        info!(
            "ModelHub 已启动：{} 个模型后端，{} 个 Provider 连接池",
            self.registry.count().await,
            self.pools.provider_ids().await.len()
        );

        let mut ticker = interval(STATUS_REPORT_INTERVAL);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report_status().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("收到关闭信号，停止 ModelHub");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn report_status(&self) {
        let metrics = self.scheduler.get_metrics().await;
        self.metrics
            .update_queue_depth(metrics.pending_tasks as usize, metrics.running_tasks as usize);
        info!(
            "调度器状态: 总数={} 完成={} 失败={} 超时={} 等待={} 运行中={} 成功率={:.2}",
            metrics.total_tasks,
            metrics.completed_tasks,
            metrics.failed_tasks,
            metrics.timed_out_tasks,
            metrics.pending_tasks,
            metrics.running_tasks,
            metrics.success_rate()
        );

        for provider_id in self.pools.provider_ids().await {
            if let Some(stats) = self.pools.pool_stats(&provider_id).await {
                debug!(
                    "连接池 {}: 总数={} 活跃={} 等待={} 命中率={:.2}",
                    provider_id,
                    stats.total_connections,
                    stats.active_connections,
                    stats.waiting_acquirers,
                    stats.hit_rate
                );
            }
        }
    }

    /// 停止调度循环并释放全部连接池，可重复调用
    pub async fn shutdown(&self) {
        self.scheduler.dispose().await;
        self.pools.dispose().await;
        info!("ModelHub 已关闭");
    }
}

fn task_outcome(task: ScheduledTask) -> HubResult<Value> {
    match (task.status, task.failure) {
        (TaskStatus::Completed, _) => Ok(task.result.unwrap_or(Value::Null)),
        (_, Some(TaskFailure::Timeout)) => Err(HubError::TaskTimeout {
            task_id: task.id,
            timeout_ms: task.timeout_ms.unwrap_or_default(),
        }),
        (_, Some(TaskFailure::ModelSystemNotFound)) => {
            Err(HubError::model_system_not_found(task.model_id))
        }
        (_, Some(TaskFailure::ModelSystemUnavailable)) => {
            Err(HubError::model_system_unavailable(task.model_id))
        }
        (_, Some(TaskFailure::ExecutionError(message))) => Err(HubError::execution_error(message)),
        (status, None) => {
            warn!("任务 {} 状态为 {} 但没有失败原因", task.id, status.as_str());
            Err(HubError::Internal(format!("任务 {} 缺少失败原因", task.id)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn failed_task(failure: TaskFailure) -> ScheduledTask {
        let mut task = ScheduledTask::new("gpt", TaskPriority::Normal, Value::Null, Some(250));
        task.mark_failed(failure, Utc::now());
        task
    }

    #[test]
    fn test_task_outcome_mapping() {
        let timed_out = task_outcome(failed_task(TaskFailure::Timeout));
        assert!(matches!(
            timed_out,
            Err(HubError::TaskTimeout { timeout_ms: 250, .. })
        ));

        let missing = task_outcome(failed_task(TaskFailure::ModelSystemNotFound));
        assert!(matches!(missing, Err(HubError::ModelSystemNotFound { model_id }) if model_id == "gpt"));

        let unavailable = task_outcome(failed_task(TaskFailure::ModelSystemUnavailable));
        assert!(matches!(unavailable, Err(HubError::ModelSystemUnavailable { .. })));

        let failed = task_outcome(failed_task(TaskFailure::ExecutionError("boom".to_string())));
        assert!(matches!(failed, Err(HubError::TaskExecution(msg)) if msg == "boom"));
    }

    #[test]
    fn test_completed_task_outcome() {
        let mut task = ScheduledTask::new("gpt", TaskPriority::High, Value::Null, None);
        task.mark_running(Utc::now());
        task.mark_completed(serde_json::json!({"ok": true}), Utc::now());

        assert_eq!(task_outcome(task).unwrap(), serde_json::json!({"ok": true}));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = HubConfig::default();
        config.scheduler.processing_interval_ms = 0;
        assert!(Coordinator::new(config).is_err());
    }
}
