use metrics::{counter, gauge, histogram, Counter, Histogram};

use aijob_domain::entities::TaskStatus;
use aijob_domain::metrics::MetricsSink;

/// 基于 `metrics` facade 的指标实现
///
/// 固定标签的指标在构造时注册句柄，按模型标签的队列深度在
/// 上报时动态创建。
pub struct PrometheusMetricsSink {
    assignments_total: Counter,
    assignment_pass_duration: Histogram,
    task_retries_total: Counter,
    task_timeouts_total: Counter,
    workers_offline_total: Counter,
    heartbeats_total: Counter,
}

impl PrometheusMetricsSink {
    pub fn new() -> Self {
        Self {
            assignments_total: counter!("aijob_assignments_total"),
            assignment_pass_duration: histogram!("aijob_assignment_pass_duration_seconds"),
            task_retries_total: counter!("aijob_task_retries_total"),
            task_timeouts_total: counter!("aijob_task_timeouts_total"),
            workers_offline_total: counter!("aijob_workers_offline_total"),
            heartbeats_total: counter!("aijob_worker_heartbeats_total"),
        }
    }
}

impl Default for PrometheusMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn record_assignment(&self) {
        self.assignments_total.increment(1);
    }

    fn record_assignment_pass(&self, duration_seconds: f64) {
        self.assignment_pass_duration.record(duration_seconds);
    }

    fn record_queue_depth(&self, model_name: &str, depth: usize) {
        let model = if model_name.is_empty() {
            "any".to_string()
        } else {
            model_name.to_string()
        };
        gauge!("aijob_queue_depth", "model" => model).set(depth as f64);
    }

    fn record_task_retry(&self) {
        self.task_retries_total.increment(1);
    }

    fn record_task_timeout(&self) {
        self.task_timeouts_total.increment(1);
    }

    fn record_task_terminal(&self, status: TaskStatus) {
        counter!("aijob_tasks_terminal_total", "status" => status.as_str()).increment(1);
    }

    fn record_worker_offline(&self) {
        self.workers_offline_total.increment(1);
    }

    fn record_heartbeat(&self) {
        self.heartbeats_total.increment(1);
    }
}
