use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use aijob_domain::entities::{Task, TaskStatus, WorkerInfo, WorkerStatus};
use aijob_domain::metrics::MetricsSink;
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_errors::SchedulerResult;

use crate::resource_ledger::ResourceLedger;

/// Worker失联检测
///
/// 心跳超过 2 × heartbeat_interval 未更新的Worker被判定离线；其上的
/// 任务按重试预算决定重新入队或终止。对已离线的Worker重复执行是
/// 无操作，保证幂等。
pub struct LivenessMonitor {
    task_repo: Arc<dyn TaskRepository>,
    worker_repo: Arc<dyn WorkerRepository>,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<dyn MetricsSink>,
    heartbeat_interval: Duration,
}

impl LivenessMonitor {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        worker_repo: Arc<dyn WorkerRepository>,
        ledger: Arc<ResourceLedger>,
        metrics: Arc<dyn MetricsSink>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            task_repo,
            worker_repo,
            ledger,
            metrics,
            heartbeat_interval,
        }
    }

    fn is_stale(&self, worker: &WorkerInfo, threshold: chrono::DateTime<Utc>) -> bool {
        worker.status != WorkerStatus::Offline && worker.last_heartbeat < threshold
    }

    /// 执行一轮检测，返回处理的失联Worker数量
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> SchedulerResult<u64> {
        let threshold = Utc::now() - self.heartbeat_interval * 2;
        let workers = self.worker_repo.list().await?;
        let mut handled = 0;

        for worker in workers {
            if !self.is_stale(&worker, threshold) {
                continue;
            }

            warn!(
                "检测到失联Worker: {} (上次心跳: {})",
                worker.id,
                worker.last_heartbeat.format("%Y-%m-%d %H:%M:%S UTC")
            );

            // 先处理孤儿任务，任务写失败则整体跳过，下一轮重试
            let mut orphaned_task = None;
            if let Some(task_id) = &worker.current_task_id {
                match self.task_repo.get_by_id(task_id).await {
                    Ok(Some(task)) => {
                        if task.is_dispatched() {
                            match self.requeue_or_fail(task).await {
                                Ok(task) => orphaned_task = Some(task),
                                Err(e) => {
                                    error!("处理失联Worker {} 的孤儿任务失败: {}", worker.id, e);
                                    continue;
                                }
                            }
                        } else {
                            // 已终态（如取消后Worker一直未报告），只需回收资源
                            debug!(
                                "失联Worker {} 持有的任务 {} 已是终态 {}",
                                worker.id, task.id, task.status
                            );
                            orphaned_task = Some(task);
                        }
                    }
                    Ok(None) => {
                        warn!("失联Worker {} 引用的任务 {} 不存在", worker.id, task_id);
                    }
                    Err(e) => {
                        error!("加载失联Worker {} 的任务 {} 失败: {}", worker.id, task_id, e);
                        continue;
                    }
                }
            }

            let mut offline = worker.clone();
            offline.status = WorkerStatus::Offline;
            offline.current_task_id = None;
            if let Err(e) = self.worker_repo.update(&offline).await {
                error!("标记Worker {} 离线失败: {}", worker.id, e);
                continue;
            }

            if let Some(task) = &orphaned_task {
                self.ledger.release(&worker.id, task).await;
            }

            self.metrics.record_worker_offline();
            handled += 1;
        }

        Ok(handled)
    }

    /// 孤儿策略：预算内重新入队，预算耗尽则终止
    async fn requeue_or_fail(&self, mut task: Task) -> SchedulerResult<Task> {
        if task.can_retry() {
            task.retry_count += 1;
            task.status = TaskStatus::Pending;
            task.worker_id = None;
            // 下一次运行报告重新开始计时
            task.started_at = None;
            self.task_repo.update(&task).await?;
            self.metrics.record_task_retry();
            info!(
                "孤儿任务 {} 重新入队，已消耗重试 {}/{}",
                task.id, task.retry_count, task.max_retries
            );
        } else {
            task.status = TaskStatus::Failed;
            task.error = "Worker失联且重试预算耗尽".to_string();
            task.completed_at = Some(Utc::now());
            self.task_repo.update(&task).await?;
            self.metrics.record_task_terminal(TaskStatus::Failed);
            warn!(
                "孤儿任务 {} 重试预算耗尽（{}次），标记为失败",
                task.id, task.max_retries
            );
        }
        Ok(task)
    }
}
