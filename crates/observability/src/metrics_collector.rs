use anyhow::Result;
use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};
use tracing::debug;

/// Prometheus-facing counters for the scheduler and the connection pools.
///
/// Without an installed recorder every handle is a no-op.
pub struct MetricsCollector {
    // Task metrics
    tasks_scheduled_total: Counter,
    tasks_dispatched_total: Counter,
    tasks_completed_total: Counter,
    tasks_timed_out_total: Counter,
    task_wait_time: Histogram,
    task_processing_time: Histogram,

    // Queue metrics
    queue_depth: Gauge,
    running_tasks: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let tasks_scheduled_total = counter!("modelhub_tasks_scheduled_total");
        let tasks_dispatched_total = counter!("modelhub_tasks_dispatched_total");
        let tasks_completed_total = counter!("modelhub_tasks_completed_total");
        let tasks_timed_out_total = counter!("modelhub_tasks_timed_out_total");
        let task_wait_time = histogram!("modelhub_task_wait_time_seconds");
        let task_processing_time = histogram!("modelhub_task_processing_time_seconds");

        let queue_depth = gauge!("modelhub_queue_depth");
        let running_tasks = gauge!("modelhub_running_tasks");

        Ok(Self {
            tasks_scheduled_total,
            tasks_dispatched_total,
            tasks_completed_total,
            tasks_timed_out_total,
            task_wait_time,
            task_processing_time,
            queue_depth,
            running_tasks,
        })
    }

    // Task metrics

    pub fn record_task_scheduled(&self, priority: &str) {
        self.tasks_scheduled_total.increment(1);
        counter!("modelhub_tasks_scheduled_by_priority_total", "priority" => priority.to_string())
            .increment(1);
    }

    pub fn record_task_dispatched(&self, wait_time_ms: f64) {
        self.tasks_dispatched_total.increment(1);
        self.task_wait_time.record(wait_time_ms / 1000.0);
    }

    pub fn record_task_completed(&self, processing_time_ms: f64) {
        self.tasks_completed_total.increment(1);
        self.task_processing_time.record(processing_time_ms / 1000.0);
    }

    /// `reason` is a low-cardinality label such as `timeout` or `execution_error`
    pub fn record_task_failed(&self, reason: &str) {
        counter!("modelhub_tasks_failed_total", "reason" => reason.to_string()).increment(1);
        if reason == "timeout" {
            self.tasks_timed_out_total.increment(1);
        }
        debug!(reason = reason, "Task failure recorded");
    }

    pub fn update_queue_depth(&self, pending: usize, running: usize) {
        self.queue_depth.set(pending as f64);
        self.running_tasks.set(running as f64);
    }

    // Pool metrics

    pub fn record_connection_created(&self, provider_id: &str) {
        counter!("modelhub_pool_connections_created_total", "provider" => provider_id.to_string())
            .increment(1);
    }

    pub fn record_connection_acquired(&self, provider_id: &str, wait_seconds: f64) {
        counter!("modelhub_pool_acquisitions_total", "provider" => provider_id.to_string())
            .increment(1);
        histogram!("modelhub_pool_acquire_wait_seconds", "provider" => provider_id.to_string())
            .record(wait_seconds);
    }

    pub fn record_acquire_timeout(&self, provider_id: &str) {
        counter!("modelhub_pool_acquire_timeouts_total", "provider" => provider_id.to_string())
            .increment(1);
    }

    pub fn update_pool_size(&self, provider_id: &str, active: usize, total: usize) {
        gauge!("modelhub_pool_active_connections", "provider" => provider_id.to_string())
            .set(active as f64);
        gauge!("modelhub_pool_connections", "provider" => provider_id.to_string())
            .set(total as f64);
    }

    pub fn record_health_check(&self, provider_id: &str, healthy: bool, latency_ms: Option<f64>) {
        gauge!("modelhub_provider_healthy", "provider" => provider_id.to_string())
            .set(if healthy { 1.0 } else { 0.0 });
        if let Some(latency) = latency_ms {
            histogram!("modelhub_provider_latency_seconds", "provider" => provider_id.to_string())
                .record(latency / 1000.0);
        }
    }
}
