//! 测试替身
//!
//! `RecordingMetricsSink` 记录指标调用供断言；`Failing*Repository`
//! 包装真实存储并注入可控的写失败，用于补偿与重试路径的测试。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;

use aijob_domain::entities::{Task, TaskStatus, WorkerInfo};
use aijob_domain::metrics::MetricsSink;
use aijob_domain::repositories::{TaskFilter, TaskRepository, WorkerRepository};
use aijob_errors::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
    counters: Mutex<HashMap<String, u64>>,
    queue_depth: Mutex<HashMap<String, usize>>,
}

impl RecordingMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, key: &str) {
        *self.counters.lock().unwrap().entry(key.to_string()).or_default() += 1;
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counters.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn queue_depth(&self, model_name: &str) -> Option<usize> {
        self.queue_depth.lock().unwrap().get(model_name).copied()
    }
}

impl MetricsSink for RecordingMetricsSink {
    fn record_assignment(&self) {
        self.bump("assignment");
    }

    fn record_assignment_pass(&self, _duration_seconds: f64) {
        self.bump("assignment_pass");
    }

    fn record_queue_depth(&self, model_name: &str, depth: usize) {
        self.queue_depth
            .lock()
            .unwrap()
            .insert(model_name.to_string(), depth);
    }

    fn record_task_retry(&self) {
        self.bump("task_retry");
    }

    fn record_task_timeout(&self) {
        self.bump("task_timeout");
    }

    fn record_task_terminal(&self, status: TaskStatus) {
        self.bump(&format!("terminal_{status}"));
    }

    fn record_worker_offline(&self) {
        self.bump("worker_offline");
    }

    fn record_heartbeat(&self) {
        self.bump("heartbeat");
    }
}

/// 包装任务存储，让接下来的 N 次 `update` 失败
pub struct FailingTaskRepository {
    inner: Arc<dyn TaskRepository>,
    fail_updates: AtomicUsize,
}

impl FailingTaskRepository {
    pub fn new(inner: Arc<dyn TaskRepository>) -> Self {
        Self {
            inner,
            fail_updates: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_updates(&self, count: usize) {
        self.fail_updates.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current > 0).then(|| current - 1)
            })
            .is_ok()
    }
}

#[async_trait]
impl TaskRepository for FailingTaskRepository {
    async fn create(&self, task: &Task) -> SchedulerResult<()> {
        self.inner.create(task).await
    }

    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<Task>> {
        self.inner.get_by_id(id).await
    }

    async fn update(&self, task: &Task) -> SchedulerResult<()> {
        if self.take_failure() {
            return Err(SchedulerError::database_error("注入的任务更新失败"));
        }
        self.inner.update(task).await
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        self.inner.list(filter).await
    }

    async fn list_pending(&self, limit: i64) -> SchedulerResult<Vec<Task>> {
        self.inner.list_pending(limit).await
    }

    async fn list_running(&self, limit: i64, offset: i64) -> SchedulerResult<Vec<Task>> {
        self.inner.list_running(limit, offset).await
    }

    async fn count_by_status(&self, status: TaskStatus) -> SchedulerResult<i64> {
        self.inner.count_by_status(status).await
    }
}

/// 包装Worker存储，让接下来的 N 次 `update` 失败
pub struct FailingWorkerRepository {
    inner: Arc<dyn WorkerRepository>,
    fail_updates: AtomicUsize,
}

impl FailingWorkerRepository {
    pub fn new(inner: Arc<dyn WorkerRepository>) -> Self {
        Self {
            inner,
            fail_updates: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_updates(&self, count: usize) {
        self.fail_updates.store(count, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.fail_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current > 0).then(|| current - 1)
            })
            .is_ok()
    }
}

#[async_trait]
impl WorkerRepository for FailingWorkerRepository {
    async fn register(&self, worker: &WorkerInfo) -> SchedulerResult<()> {
        self.inner.register(worker).await
    }

    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<WorkerInfo>> {
        self.inner.get_by_id(id).await
    }

    async fn update(&self, worker: &WorkerInfo) -> SchedulerResult<()> {
        if self.take_failure() {
            return Err(SchedulerError::database_error("注入的Worker更新失败"));
        }
        self.inner.update(worker).await
    }

    async fn update_heartbeat(&self, id: &str) -> SchedulerResult<()> {
        self.inner.update_heartbeat(id).await
    }

    async fn list(&self) -> SchedulerResult<Vec<WorkerInfo>> {
        self.inner.list().await
    }

    async fn list_available(&self, freshness: Duration) -> SchedulerResult<Vec<WorkerInfo>> {
        self.inner.list_available(freshness).await
    }
}
