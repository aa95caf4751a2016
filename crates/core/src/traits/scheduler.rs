use async_trait::async_trait;

use crate::models::{ScheduledTask, SchedulerMetrics, TaskId, TaskPriority};

/// 任务调度服务接口
///
/// 调度接口本身从不失败：后端不存在、执行出错或超时都只会体现在
/// 任务状态与聚合指标上，调用方需要通过 `get_task_status` 轮询。
#[async_trait]
pub trait TaskSchedulingService: Send + Sync {
    /// 提交任务，立即返回任务ID
    async fn schedule_task(
        &self,
        model_id: &str,
        priority: TaskPriority,
        payload: serde_json::Value,
        timeout_ms: Option<u64>,
    ) -> TaskId;

    /// 查询任务状态，未知ID返回 None
    async fn get_task_status(&self, task_id: &str) -> Option<ScheduledTask>;

    /// 获取聚合指标快照
    async fn get_metrics(&self) -> SchedulerMetrics;

    /// 停止派发与超时检查，未完成的任务原样保留
    async fn dispose(&self);
}
