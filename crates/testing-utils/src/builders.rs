//! 测试实体构造器
//!
//! 提供带合理默认值的链式构造，测试里只需声明与用例相关的字段。

use chrono::{DateTime, Duration, Utc};

use aijob_domain::entities::{Task, TaskPriority, TaskStatus, WorkerInfo, WorkerStatus};

const GIB: i64 = 1024 * 1024 * 1024;

pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new("test_task", "", "test-user", TaskPriority::Normal, vec![]),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.task.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_model(mut self, model_name: &str) -> Self {
        self.task.model_name = model_name.to_string();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_input(mut self, input: Vec<u8>) -> Self {
        self.task.input = input;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.task.created_at = created_at;
        self
    }

    pub fn created_seconds_ago(mut self, seconds: i64) -> Self {
        self.task.created_at = Utc::now() - Duration::seconds(seconds);
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: i64) -> Self {
        self.task.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.task.max_retries = max_retries;
        self
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.task.retry_count = retry_count;
        self
    }

    pub fn assigned_to(mut self, worker_id: &str) -> Self {
        self.task.worker_id = Some(worker_id.to_string());
        self
    }

    pub fn started_seconds_ago(mut self, seconds: i64) -> Self {
        self.task.started_at = Some(Utc::now() - Duration::seconds(seconds));
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WorkerBuilder {
    worker: WorkerInfo,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        let mut worker = WorkerInfo::new("test-worker", vec![]);
        worker.available_cpu = 2.0;
        worker.available_memory = 4 * GIB;
        worker.available_gpu = 1.0;
        Self { worker }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.worker.id = id.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.worker.name = name.to_string();
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.worker.capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.worker.status = status;
        self
    }

    pub fn with_resources(mut self, cpu: f64, memory_bytes: i64, gpu: f64) -> Self {
        self.worker.available_cpu = cpu;
        self.worker.available_memory = memory_bytes;
        self.worker.available_gpu = gpu;
        self
    }

    pub fn with_current_task(mut self, task_id: &str) -> Self {
        self.worker.current_task_id = Some(task_id.to_string());
        self.worker.status = WorkerStatus::Busy;
        self
    }

    pub fn heartbeat_seconds_ago(mut self, seconds: i64) -> Self {
        self.worker.last_heartbeat = Utc::now() - Duration::seconds(seconds);
        self
    }

    pub fn build(self) -> WorkerInfo {
        self.worker
    }
}

impl Default for WorkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
