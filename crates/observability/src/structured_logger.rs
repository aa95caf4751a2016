use std::fmt;
use std::str::FromStr;

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_location: bool,
    pub include_thread_id: bool,
    pub include_thread_name: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            other => Err(anyhow::anyhow!("不支持的日志格式: {}", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
            LogFormat::Compact => "compact",
        };
        f.write_str(name)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_location: true,
            include_thread_id: false,
            include_thread_name: false,
        }
    }
}

impl LoggingConfig {
    /// 由配置文件中的级别与格式字符串构造
    pub fn from_level_and_format(level: &str, format: &str) -> anyhow::Result<Self> {
        Ok(Self {
            level: level.to_lowercase(),
            format: format.parse()?,
            ..Default::default()
        })
    }
}

/// Structured lifecycle events for tasks and connection pools
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_scheduled(task_id: &str, model_id: &str, priority: &str, timeout_ms: Option<u64>) {
        info!(
            event = "task_scheduled",
            task.id = task_id,
            task.model_id = model_id,
            task.priority = priority,
            task.timeout_ms = timeout_ms,
            "Task accepted into queue"
        );
    }

    pub fn log_task_dispatched(task_id: &str, model_id: &str, wait_time_ms: f64) {
        info!(
            event = "task_dispatched",
            task.id = task_id,
            task.model_id = model_id,
            task.wait_time_ms = wait_time_ms,
            "Task dispatched to model system"
        );
    }

    pub fn log_task_completed(task_id: &str, model_id: &str, processing_time_ms: f64) {
        info!(
            event = "task_completed",
            task.id = task_id,
            task.model_id = model_id,
            task.processing_time_ms = processing_time_ms,
            "Task completed successfully"
        );
    }

    pub fn log_task_failed(task_id: &str, model_id: &str, reason: &str) {
        error!(
            event = "task_failed",
            task.id = task_id,
            task.model_id = model_id,
            task.error = reason,
            "Task failed"
        );
    }

    pub fn log_task_timed_out(task_id: &str, model_id: &str, timeout_ms: u64) {
        warn!(
            event = "task_timed_out",
            task.id = task_id,
            task.model_id = model_id,
            task.timeout_ms = timeout_ms,
            "Task exceeded its deadline"
        );
    }

    pub fn log_connection_created(provider_id: &str, pool_size: usize, max_size: usize) {
        info!(
            event = "connection_created",
            pool.provider_id = provider_id,
            pool.size = pool_size,
            pool.max_size = max_size,
            "Pool connection created"
        );
    }

    pub fn log_connection_released(provider_id: &str, handed_off: bool) {
        debug!(
            event = "connection_released",
            pool.provider_id = provider_id,
            pool.handed_off = handed_off,
            "Pool connection released"
        );
    }

    pub fn log_pool_disposed(provider_id: &str, connections: usize, failed_disconnects: usize) {
        info!(
            event = "pool_disposed",
            pool.provider_id = provider_id,
            pool.connections = connections,
            pool.failed_disconnects = failed_disconnects,
            "Connection pool disposed"
        );
    }

    pub fn log_health_check(
        provider_id: &str,
        healthy: bool,
        healthy_connections: usize,
        total_connections: usize,
        average_latency_ms: Option<f64>,
    ) {
        if healthy {
            debug!(
                event = "health_check",
                pool.provider_id = provider_id,
                pool.healthy = healthy,
                pool.healthy_connections = healthy_connections,
                pool.total_connections = total_connections,
                pool.average_latency_ms = average_latency_ms,
                "Provider health check passed"
            );
        } else {
            warn!(
                event = "health_check",
                pool.provider_id = provider_id,
                pool.healthy = healthy,
                pool.healthy_connections = healthy_connections,
                pool.total_connections = total_connections,
                "Provider health check failed"
            );
        }
    }

    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            error.component = component,
            error.operation = operation,
            error.message = %error,
            "System error occurred"
        );
    }
}
