use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use modelhub_core::{
    ModelSystem, ScheduledTask, SchedulerConfig, SchedulerMetrics, SystemManager, TaskFailure,
    TaskId, TaskPriority, TaskSchedulingService,
};
use modelhub_errors::{HubError, HubResult};
use modelhub_observability::{MetricsCollector, StructuredLogger};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue::PriorityTaskQueue;

struct TaskEntry {
    task: ScheduledTask,
    cancel: CancellationToken,
    /// 单调时钟，超时判定只依赖它
    accepted_at: Instant,
}

#[derive(Debug, Default)]
struct SchedulerStats {
    total: u64,
    completed: u64,
    failed: u64,
    timed_out: u64,
    wait_total_ms: f64,
    wait_samples: u64,
    processing_total_ms: f64,
    processing_samples: u64,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskEntry>,
    queue: PriorityTaskQueue,
    running: u64,
    stats: SchedulerStats,
    /// 终态任务按完成顺序排列，用于淘汰历史
    finished: VecDeque<TaskId>,
}

impl SchedulerState {
    fn snapshot(&self) -> SchedulerMetrics {
        let stats = &self.stats;
        SchedulerMetrics {
            total_tasks: stats.total,
            completed_tasks: stats.completed,
            failed_tasks: stats.failed,
            pending_tasks: self.queue.len() as u64,
            running_tasks: self.running,
            timed_out_tasks: stats.timed_out,
            average_wait_time_ms: average(stats.wait_total_ms, stats.wait_samples),
            average_processing_time_ms: average(
                stats.processing_total_ms,
                stats.processing_samples,
            ),
        }
    }

    /// 将任务从 Pending 转为 Running，返回执行所需的载荷与取消令牌
    fn begin_dispatch(&mut self, task_id: &str) -> Option<(Value, CancellationToken, f64)> {
        let entry = self.tasks.get_mut(task_id)?;
        if !entry.task.is_pending() {
            return None;
        }

        entry.task.mark_running(Utc::now());
        let wait_ms = entry.task.wait_time_ms().unwrap_or(0.0);
        let dispatch = (entry.task.payload.clone(), entry.cancel.clone(), wait_ms);

        self.queue.remove(task_id);
        self.running += 1;
        Some(dispatch)
    }

    /// 唯一的终态转换入口；任务已是终态或不存在时返回 false
    fn terminate(
        &mut self,
        task_id: &str,
        outcome: Result<Value, TaskFailure>,
        max_history: usize,
        metrics: &MetricsCollector,
    ) -> bool {
        let Some(entry) = self.tasks.get_mut(task_id) else {
            return false;
        };
        if entry.task.is_terminal() {
            return false;
        }

        let was_running = entry.task.is_running();
        let now = Utc::now();
        match outcome {
            Ok(result) => entry.task.mark_completed(result, now),
            Err(failure) => entry.task.mark_failed(failure, now),
        }
        entry.cancel.cancel();

        let task = &entry.task;
        if let Some(wait_ms) = task.wait_time_ms() {
            self.stats.wait_total_ms += wait_ms;
            self.stats.wait_samples += 1;
        }

        match &task.failure {
            None => {
                let processing_ms = task.processing_time_ms().unwrap_or(0.0);
                self.stats.completed += 1;
                self.stats.processing_total_ms += processing_ms;
                self.stats.processing_samples += 1;
                StructuredLogger::log_task_completed(&task.id, &task.model_id, processing_ms);
                metrics.record_task_completed(processing_ms);
            }
            Some(failure) => {
                self.stats.failed += 1;
                if *failure == TaskFailure::Timeout {
                    self.stats.timed_out += 1;
                    StructuredLogger::log_task_timed_out(
                        &task.id,
                        &task.model_id,
                        task.timeout_ms.unwrap_or(0),
                    );
                } else {
                    StructuredLogger::log_task_failed(
                        &task.id,
                        &task.model_id,
                        &failure.to_string(),
                    );
                }
                metrics.record_task_failed(failure.as_label());
            }
        }

        if was_running {
            self.running = self.running.saturating_sub(1);
        } else {
            self.queue.remove(task_id);
        }

        self.finished.push_back(task_id.to_string());
        self.prune_history(max_history);
        true
    }

    fn prune_history(&mut self, max_history: usize) {
        while self.finished.len() > max_history {
            if let Some(oldest) = self.finished.pop_front() {
                self.tasks.remove(&oldest);
            }
        }
    }

    fn expired_tasks(&self, now: Instant) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|(_, entry)| !entry.task.is_terminal())
            .filter(|(_, entry)| {
                entry.task.timeout_ms.is_some_and(|timeout_ms| {
                    now.duration_since(entry.accepted_at) >= Duration::from_millis(timeout_ms)
                })
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知错误".to_string()
    }
}

fn average(total: f64, samples: u64) -> f64 {
    if samples == 0 {
        0.0
    } else {
        total / samples as f64
    }
}

/// 单个派发周期内对某个模型后端的判定结果
#[derive(Clone)]
enum Resolution {
    Ready(Arc<dyn ModelSystem>),
    Busy,
    Missing,
    Unavailable,
}

struct SchedulerCore {
    config: SchedulerConfig,
    system_manager: Arc<dyn SystemManager>,
    state: Arc<Mutex<SchedulerState>>,
    metrics: Arc<MetricsCollector>,
}

impl SchedulerCore {
    async fn schedule(
        &self,
        model_id: &str,
        priority: TaskPriority,
        payload: Value,
        timeout_ms: Option<u64>,
    ) -> TaskId {
        let task = ScheduledTask::new(model_id, priority, payload, timeout_ms);
        let task_id = task.id.clone();

        let mut state = self.state.lock().await;
        state.queue.push(task_id.clone(), priority);
        state.tasks.insert(
            task_id.clone(),
            TaskEntry {
                task,
                cancel: CancellationToken::new(),
                accepted_at: Instant::now(),
            },
        );
        state.stats.total += 1;

        StructuredLogger::log_task_scheduled(&task_id, model_id, priority.as_str(), timeout_ms);
        self.metrics.record_task_scheduled(priority.as_str());
        self.metrics
            .update_queue_depth(state.queue.len(), state.running as usize);

        task_id
    }

    async fn resolve(&self, model_id: &str) -> Resolution {
        let Some(system) = self.system_manager.get_system(model_id).await else {
            return Resolution::Missing;
        };
        let status = system.get_status().await;
        if !status.available {
            Resolution::Unavailable
        } else if status.busy {
            Resolution::Busy
        } else {
            Resolution::Ready(system)
        }
    }

    async fn process_tick(&self) -> Option<TaskId> {
        let candidates: Vec<(TaskId, String)> = {
            let state = self.state.lock().await;
            state
                .queue
                .iter()
                .filter_map(|id| {
                    state
                        .tasks
                        .get(id)
                        .map(|entry| (id.clone(), entry.task.model_id.clone()))
                })
                .collect()
        };

        let mut resolutions: HashMap<String, Resolution> = HashMap::new();
        let mut advanced = None;

        for (task_id, model_id) in candidates {
            let resolution = match resolutions.get(&model_id) {
                Some(resolution) => resolution.clone(),
                None => {
                    let resolution = self.resolve(&model_id).await;
                    resolutions.insert(model_id.clone(), resolution.clone());
                    resolution
                }
            };

            let failure = match resolution {
                Resolution::Busy => continue,
                Resolution::Missing => TaskFailure::ModelSystemNotFound,
                Resolution::Unavailable => TaskFailure::ModelSystemUnavailable,
                Resolution::Ready(system) => {
                    if self.dispatch(&task_id, &model_id, system).await {
                        advanced = Some(task_id);
                        break;
                    }
                    continue;
                }
            };

            let mut state = self.state.lock().await;
            let pending = state
                .tasks
                .get(&task_id)
                .is_some_and(|entry| entry.task.is_pending());
            if pending
                && state.terminate(&task_id, Err(failure), self.config.max_task_history, &self.metrics)
            {
                advanced = Some(task_id);
                break;
            }
        }

        let state = self.state.lock().await;
        self.metrics
            .update_queue_depth(state.queue.len(), state.running as usize);

        advanced
    }

    async fn dispatch(&self, task_id: &str, model_id: &str, system: Arc<dyn ModelSystem>) -> bool {
        let Some((payload, cancel, wait_ms)) = self.state.lock().await.begin_dispatch(task_id)
        else {
            debug!("任务 {} 已不在等待状态，跳过派发", task_id);
            return false;
        };

        StructuredLogger::log_task_dispatched(task_id, model_id, wait_ms);
        self.metrics.record_task_dispatched(wait_ms);

        let state = Arc::clone(&self.state);
        let metrics = Arc::clone(&self.metrics);
        let max_history = self.config.max_task_history;
        let task_id = task_id.to_string();

        tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(system.execute_task(&payload, cancel))
                .catch_unwind()
                .await
            {
                Ok(result) => result.map_err(|e| TaskFailure::ExecutionError(e.to_string())),
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!("任务 {} 的模型后端发生 panic: {}", task_id, message);
                    Err(TaskFailure::ExecutionError(format!("模型后端异常退出: {message}")))
                }
            };

            let mut state = state.lock().await;
            if !state.terminate(&task_id, outcome, max_history, &metrics) {
                debug!("任务 {} 已结束，忽略迟到的执行结果", task_id);
            }
        });

        true
    }

    async fn check_timeouts(&self) -> usize {
        let mut state = self.state.lock().await;
        let expired = state.expired_tasks(Instant::now());

        let mut timed_out = 0;
        for task_id in expired {
            if state.terminate(
                &task_id,
                Err(TaskFailure::Timeout),
                self.config.max_task_history,
                &self.metrics,
            ) {
                timed_out += 1;
            }
        }
        timed_out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Disposed,
}

struct LoopControl {
    lifecycle: Lifecycle,
    shutdown_tx: Option<broadcast::Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

/// Priority scheduler for model invocations.
///
/// Tasks are accepted immediately and advanced one per dispatch tick. A
/// separate watchdog fails tasks whose deadline has passed. Neither loop runs
/// until [`TaskScheduler::start`] is called; tests may drive
/// [`TaskScheduler::process_tick`] and [`TaskScheduler::check_timeouts`]
/// directly instead.
pub struct TaskScheduler {
    core: Arc<SchedulerCore>,
    control: Mutex<LoopControl>,
}

impl TaskScheduler {
    pub fn new(config: SchedulerConfig, system_manager: Arc<dyn SystemManager>) -> HubResult<Self> {
        let metrics = MetricsCollector::new()
            .map_err(|e| HubError::Internal(format!("初始化指标采集器失败: {e}")))?;
        Self::with_metrics(config, system_manager, Arc::new(metrics))
    }

    pub fn with_metrics(
        config: SchedulerConfig,
        system_manager: Arc<dyn SystemManager>,
        metrics: Arc<MetricsCollector>,
    ) -> HubResult<Self> {
        config
            .validate()
            .map_err(|e| HubError::config_error(format!("调度器配置无效: {e}")))?;

        Ok(Self {
            core: Arc::new(SchedulerCore {
                config,
                system_manager,
                state: Arc::new(Mutex::new(SchedulerState::default())),
                metrics,
            }),
            control: Mutex::new(LoopControl {
                lifecycle: Lifecycle::Created,
                shutdown_tx: None,
                handles: Vec::new(),
            }),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.core.config
    }

    /// 启动派发循环与超时看门狗
    pub async fn start(&self) -> HubResult<()> {
        let mut control = self.control.lock().await;
        match control.lifecycle {
            Lifecycle::Running => {
                return Err(HubError::Internal("调度器已在运行".to_string()));
            }
            Lifecycle::Disposed => {
                return Err(HubError::Internal("调度器已释放，无法重新启动".to_string()));
            }
            Lifecycle::Created => {}
        }

        let (shutdown_tx, dispatch_rx) = broadcast::channel(1);
        let watchdog_rx = shutdown_tx.subscribe();

        control.handles.push(self.spawn_dispatch_loop(dispatch_rx));
        control.handles.push(self.spawn_timeout_watchdog(watchdog_rx));
        control.shutdown_tx = Some(shutdown_tx);
        control.lifecycle = Lifecycle::Running;

        info!(
            "任务调度器已启动，派发间隔 {}ms，超时检查间隔 {}ms",
            self.core.config.processing_interval_ms, self.core.config.timeout_check_interval_ms
        );
        Ok(())
    }

    fn spawn_dispatch_loop(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let core = Arc::clone(&self.core);
        let mut ticker = interval(Duration::from_millis(core.config.processing_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        core.process_tick().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("派发循环退出");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_timeout_watchdog(&self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let core = Arc::clone(&self.core);
        let mut ticker = interval(Duration::from_millis(core.config.timeout_check_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let timed_out = core.check_timeouts().await;
                        if timed_out > 0 {
                            warn!("{} 个任务超时", timed_out);
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("超时看门狗退出");
                        break;
                    }
                }
            }
        })
    }

    pub async fn is_running(&self) -> bool {
        self.control.lock().await.lifecycle == Lifecycle::Running
    }

    pub async fn schedule_task(
        &self,
        model_id: &str,
        priority: TaskPriority,
        payload: Value,
        timeout_ms: Option<u64>,
    ) -> TaskId {
        self.core
            .schedule(model_id, priority, payload, timeout_ms)
            .await
    }

    pub async fn get_task_status(&self, task_id: &str) -> Option<ScheduledTask> {
        self.core
            .state
            .lock()
            .await
            .tasks
            .get(task_id)
            .map(|entry| entry.task.clone())
    }

    pub async fn get_metrics(&self) -> SchedulerMetrics {
        self.core.state.lock().await.snapshot()
    }

    /// Run a single dispatch step. Returns the id of the task that advanced,
    /// whether it was dispatched or failed for lack of a usable backend.
    pub async fn process_tick(&self) -> Option<TaskId> {
        self.core.process_tick().await
    }

    /// Run a single watchdog scan and return how many tasks timed out
    pub async fn check_timeouts(&self) -> usize {
        self.core.check_timeouts().await
    }

    /// 停止两个后台循环；等待中的任务原样保留。可重复调用。
    pub async fn dispose(&self) {
        let mut control = self.control.lock().await;
        if control.lifecycle == Lifecycle::Disposed {
            return;
        }
        control.lifecycle = Lifecycle::Disposed;

        if let Some(tx) = control.shutdown_tx.take() {
            let _ = tx.send(());
        }
        for handle in control.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!("调度器后台任务异常退出: {}", e);
            }
        }

        let metrics = self.core.state.lock().await.snapshot();
        info!(
            "任务调度器已停止，剩余 {} 个等待任务，{} 个运行中任务",
            metrics.pending_tasks, metrics.running_tasks
        );
    }
}

#[async_trait]
impl TaskSchedulingService for TaskScheduler {
    async fn schedule_task(
        &self,
        model_id: &str,
        priority: TaskPriority,
        payload: Value,
        timeout_ms: Option<u64>,
    ) -> TaskId {
        TaskScheduler::schedule_task(self, model_id, priority, payload, timeout_ms).await
    }

    async fn get_task_status(&self, task_id: &str) -> Option<ScheduledTask> {
        TaskScheduler::get_task_status(self, task_id).await
    }

    async fn get_metrics(&self) -> SchedulerMetrics {
        TaskScheduler::get_metrics(self).await
    }

    async fn dispose(&self) {
        TaskScheduler::dispose(self).await
    }
}
