use serde::{Deserialize, Serialize};

/// 调度器聚合指标快照
///
/// `total_tasks == completed_tasks + failed_tasks + pending_tasks + running_tasks`
/// 始终成立；`timed_out_tasks` 是 `failed_tasks` 的子集。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerMetrics {
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub pending_tasks: u64,
    pub running_tasks: u64,
    pub timed_out_tasks: u64,
    /// 已开始任务（完成或失败）的平均排队时间（毫秒）
    pub average_wait_time_ms: f64,
    /// 已完成任务的平均处理时间（毫秒）
    pub average_processing_time_ms: f64,
}

impl SchedulerMetrics {
    pub fn finished(&self) -> u64 {
        self.completed_tasks + self.failed_tasks
    }

    pub fn active(&self) -> u64 {
        self.pending_tasks + self.running_tasks
    }

    pub fn success_rate(&self) -> f64 {
        let finished = self.finished();
        if finished == 0 {
            0.0
        } else {
            self.completed_tasks as f64 / finished as f64
        }
    }
}
