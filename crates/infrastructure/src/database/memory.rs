//! 内存存储实现
//!
//! 与Postgres实现遵守同一份契约（排序、冲突、缺失语义完全一致），
//! 用于测试与无数据库的嵌入式运行。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use aijob_domain::entities::{Task, TaskStatus, WorkerInfo};
use aijob_domain::repositories::{TaskFilter, TaskRepository, WorkerRepository};
use aijob_errors::{SchedulerError, SchedulerResult};

#[derive(Debug, Clone, Default)]
pub struct MemoryTaskRepository {
    tasks: Arc<Mutex<HashMap<String, Task>>>,
}

impl MemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort_by_dispatch_order(tasks: &mut [Task]) {
        tasks.sort_by(|a, b| {
            b.priority
                .as_i32()
                .cmp(&a.priority.as_i32())
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
    }
}

#[async_trait]
impl TaskRepository for MemoryTaskRepository {
    async fn create(&self, task: &Task) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::TaskAlreadyExists {
                id: task.id.clone(),
            });
        }
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<Task>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.get(id).cloned())
    }

    async fn update(&self, task: &Task) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(SchedulerError::task_not_found(&task.id));
        }
        let mut updated = task.clone();
        updated.updated_at = Utc::now();
        tasks.insert(updated.id.clone(), updated);
        Ok(())
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut result: Vec<Task> = tasks
            .values()
            .filter(|t| filter.status.map_or(true, |s| t.status == s))
            .filter(|t| filter.user_id.as_ref().map_or(true, |u| &t.user_id == u))
            .cloned()
            .collect();

        Self::sort_by_dispatch_order(&mut result);

        if let Some(offset) = filter.offset {
            result = result.into_iter().skip(offset as usize).collect();
        }
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn list_pending(&self, limit: i64) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut pending: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        Self::sort_by_dispatch_order(&mut pending);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn list_running(&self, limit: i64, offset: i64) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut running: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == TaskStatus::Running)
            .cloned()
            .collect();
        running.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        Ok(running
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_by_status(&self, status: TaskStatus) -> SchedulerResult<i64> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.values().filter(|t| t.status == status).count() as i64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryWorkerRepository {
    workers: Arc<Mutex<HashMap<String, WorkerInfo>>>,
}

impl MemoryWorkerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkerRepository for MemoryWorkerRepository {
    async fn register(&self, worker: &WorkerInfo) -> SchedulerResult<()> {
        let mut workers = self.workers.lock().unwrap();
        if workers.contains_key(&worker.id) {
            return Err(SchedulerError::WorkerAlreadyExists {
                id: worker.id.clone(),
            });
        }
        workers.insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<WorkerInfo>> {
        let workers = self.workers.lock().unwrap();
        Ok(workers.get(id).cloned())
    }

    async fn update(&self, worker: &WorkerInfo) -> SchedulerResult<()> {
        let mut workers = self.workers.lock().unwrap();
        if !workers.contains_key(&worker.id) {
            return Err(SchedulerError::worker_not_found(&worker.id));
        }
        workers.insert(worker.id.clone(), worker.clone());
        Ok(())
    }

    async fn update_heartbeat(&self, id: &str) -> SchedulerResult<()> {
        let mut workers = self.workers.lock().unwrap();
        match workers.get_mut(id) {
            Some(worker) => {
                worker.last_heartbeat = Utc::now();
                Ok(())
            }
            None => Err(SchedulerError::worker_not_found(id)),
        }
    }

    async fn list(&self) -> SchedulerResult<Vec<WorkerInfo>> {
        let workers = self.workers.lock().unwrap();
        let mut result: Vec<WorkerInfo> = workers.values().cloned().collect();
        result.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        Ok(result)
    }

    async fn list_available(&self, freshness: Duration) -> SchedulerResult<Vec<WorkerInfo>> {
        let threshold = Utc::now() - freshness;
        let workers = self.workers.lock().unwrap();
        let mut available: Vec<WorkerInfo> = workers
            .values()
            .filter(|w| w.is_idle() && w.last_heartbeat > threshold)
            .cloned()
            .collect();
        available.sort_by(|a, b| {
            b.available_gpu
                .partial_cmp(&a.available_gpu)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.available_memory.cmp(&a.available_memory))
        });
        Ok(available)
    }
}
