use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TaskId = String;

/// 任务优先级，创建后不可修改
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Normal,
    Low,
}

impl TaskPriority {
    /// 队列排序键，数值越小越先调度
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::High => 0,
            TaskPriority::Normal => 1,
            TaskPriority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

impl Ord for TaskPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        other.rank().cmp(&self.rank())
    }
}

impl PartialOrd for TaskPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务失败原因
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum TaskFailure {
    Timeout,
    ModelSystemNotFound,
    ModelSystemUnavailable,
    ExecutionError(String),
}

impl TaskFailure {
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskFailure::Timeout => "timeout",
            TaskFailure::ModelSystemNotFound => "model_system_not_found",
            TaskFailure::ModelSystemUnavailable => "model_system_unavailable",
            TaskFailure::ExecutionError(_) => "execution_error",
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Timeout => write!(f, "任务超时"),
            TaskFailure::ModelSystemNotFound => write!(f, "模型后端未注册"),
            TaskFailure::ModelSystemUnavailable => write!(f, "模型后端不可用"),
            TaskFailure::ExecutionError(msg) => write!(f, "执行失败: {msg}"),
        }
    }
}

/// 提交给调度器的一次模型调用
///
/// 状态只会沿 `Pending → Running → (Completed | Failed)` 前进，
/// `Pending` 也可以因超时直接进入 `Failed`。终态不可再修改。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub model_id: String,
    pub priority: TaskPriority,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub timeout_ms: Option<u64>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub failure: Option<TaskFailure>,
}

impl ScheduledTask {
    pub fn new(
        model_id: impl Into<String>,
        priority: TaskPriority,
        payload: serde_json::Value,
        timeout_ms: Option<u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model_id: model_id.into(),
            priority,
            payload,
            status: TaskStatus::Pending,
            timeout_ms,
            scheduled_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            failure: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
    }

    pub fn mark_completed(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, failure: TaskFailure, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.failure = Some(failure);
    }

    /// 排队等待时间，任务未开始时为 None
    pub fn wait_time_ms(&self) -> Option<f64> {
        self.started_at
            .map(|started| (started - self.scheduled_at).num_microseconds().unwrap_or(0) as f64 / 1000.0)
    }

    pub fn processing_time_ms(&self) -> Option<f64> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => {
                Some((completed - started).num_microseconds().unwrap_or(0) as f64 / 1000.0)
            }
            _ => None,
        }
    }
}
