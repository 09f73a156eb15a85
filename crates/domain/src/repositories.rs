use async_trait::async_trait;
use chrono::Duration;

use aijob_errors::SchedulerResult;

use crate::entities::{Task, TaskStatus, WorkerInfo};

/// 任务列表查询过滤器
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub user_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 任务存储契约
///
/// 每个操作必须单独原子、落盘后才返回；跨操作的一致性由调度器的
/// 单写者模型保证，存储层不要求跨操作事务。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 插入新任务，ID冲突返回 `TaskAlreadyExists`
    async fn create(&self, task: &Task) -> SchedulerResult<()>;

    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<Task>>;

    /// 整记录覆盖写，同时刷新 `updated_at`；任务不存在返回 `TaskNotFound`
    async fn update(&self, task: &Task) -> SchedulerResult<()>;

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>>;

    /// 等待调度的任务，按 (priority DESC, created_at ASC, id ASC) 排序
    async fn list_pending(&self, limit: i64) -> SchedulerResult<Vec<Task>>;

    /// 运行中的任务，供超时清扫器分批扫描
    async fn list_running(&self, limit: i64, offset: i64) -> SchedulerResult<Vec<Task>>;

    async fn count_by_status(&self, status: TaskStatus) -> SchedulerResult<i64>;
}

/// Worker存储契约
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    /// 注册新Worker，ID冲突返回 `WorkerAlreadyExists`
    async fn register(&self, worker: &WorkerInfo) -> SchedulerResult<()>;

    async fn get_by_id(&self, id: &str) -> SchedulerResult<Option<WorkerInfo>>;

    async fn update(&self, worker: &WorkerInfo) -> SchedulerResult<()>;

    /// 仅刷新 `last_heartbeat`，不触碰其他字段
    async fn update_heartbeat(&self, id: &str) -> SchedulerResult<()>;

    async fn list(&self) -> SchedulerResult<Vec<WorkerInfo>>;

    /// 可接收任务的Worker：available、无在执行任务、心跳在新鲜度窗口内，
    /// 按 (available_gpu DESC, available_memory DESC) 排序
    async fn list_available(&self, freshness: Duration) -> SchedulerResult<Vec<WorkerInfo>>;
}
