use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, instrument, warn};

use aijob_domain::entities::{Task, TaskStatus, WorkerStatus};
use aijob_domain::metrics::MetricsSink;
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_errors::SchedulerResult;

use crate::resource_ledger::ResourceLedger;

const SWEEP_BATCH_SIZE: i64 = 100;

/// 运行中任务的墙钟超时清扫
///
/// 超时是调度器侧的硬取消：Worker可能仍在执行并在之后提交终态
/// 报告，该报告由入口的幂等规则丢弃。
pub struct TimeoutSweeper {
    task_repo: Arc<dyn TaskRepository>,
    worker_repo: Arc<dyn WorkerRepository>,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<dyn MetricsSink>,
    /// 调度器侧超时上限（秒），实际限制取任务自带值与该值的较小者
    task_timeout_ceiling_seconds: i64,
}

impl TimeoutSweeper {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        worker_repo: Arc<dyn WorkerRepository>,
        ledger: Arc<ResourceLedger>,
        metrics: Arc<dyn MetricsSink>,
        task_timeout_ceiling_seconds: i64,
    ) -> Self {
        Self {
            task_repo,
            worker_repo,
            ledger,
            metrics,
            task_timeout_ceiling_seconds,
        }
    }

    fn effective_timeout(&self, task: &Task) -> i64 {
        task.timeout_seconds.min(self.task_timeout_ceiling_seconds)
    }

    /// 执行一轮清扫，返回标记超时的任务数量
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> SchedulerResult<u64> {
        // 先收齐全部运行中任务再处理，避免边改边翻页漏扫
        let mut running = Vec::new();
        let mut offset = 0;
        loop {
            let batch = self.task_repo.list_running(SWEEP_BATCH_SIZE, offset).await?;
            let batch_len = batch.len() as i64;
            running.extend(batch);
            if batch_len < SWEEP_BATCH_SIZE {
                break;
            }
            offset += batch_len;
        }

        let now = Utc::now();
        let mut expired = 0;

        for task in running {
            let Some(started_at) = task.started_at else {
                continue;
            };
            let elapsed = (now - started_at).num_seconds();
            if elapsed <= self.effective_timeout(&task) {
                continue;
            }

            // 报告可能在列举之后到达，写入前重新确认状态
            let current = match self.task_repo.get_by_id(&task.id).await {
                Ok(Some(current)) if current.status == TaskStatus::Running => current,
                Ok(_) => continue,
                Err(e) => {
                    warn!("确认超时任务 {} 状态失败: {}", task.id, e);
                    continue;
                }
            };

            match self.expire_task(current, elapsed).await {
                Ok(()) => expired += 1,
                Err(e) => error!("处理超时任务 {} 失败，下一轮重试: {}", task.id, e),
            }
        }

        Ok(expired)
    }

    async fn expire_task(&self, mut task: Task, elapsed_seconds: i64) -> SchedulerResult<()> {
        warn!(
            "任务 {} 运行超时（{}秒，限制{}秒），强制终止",
            task.id,
            elapsed_seconds,
            self.effective_timeout(&task)
        );

        task.status = TaskStatus::Failed;
        task.error = "任务执行超时".to_string();
        task.completed_at = Some(Utc::now());
        self.task_repo.update(&task).await?;
        self.metrics.record_task_timeout();
        self.metrics.record_task_terminal(TaskStatus::Failed);

        let Some(worker_id) = &task.worker_id else {
            return Ok(());
        };

        match self.worker_repo.get_by_id(worker_id).await {
            Ok(Some(mut worker)) => {
                if worker.current_task_id.as_deref() == Some(task.id.as_str()) {
                    worker.status = WorkerStatus::Available;
                    worker.current_task_id = None;
                    if let Err(e) = self.worker_repo.update(&worker).await {
                        error!("释放超时任务的Worker {} 失败: {}", worker_id, e);
                    }
                } else {
                    debug!(
                        "Worker {} 已不再持有超时任务 {}，跳过释放",
                        worker_id, task.id
                    );
                }
                self.ledger.release(worker_id, &task).await;
            }
            Ok(None) => {
                warn!("超时任务 {} 引用的Worker {} 不存在", task.id, worker_id);
                self.ledger.release(worker_id, &task).await;
            }
            Err(e) => {
                error!("加载超时任务的Worker {} 失败: {}", worker_id, e);
            }
        }

        Ok(())
    }
}
