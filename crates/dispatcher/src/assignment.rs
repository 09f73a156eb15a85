use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use tracing::{debug, error, info, instrument, warn};

use aijob_domain::entities::{TaskStatus, WorkerStatus};
use aijob_domain::metrics::MetricsSink;
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_errors::SchedulerResult;

use crate::resource_ledger::ResourceLedger;

#[derive(Debug, Clone)]
pub struct AssignmentConfig {
    /// 单次扫描的任务批量；0 表示按可用Worker数的两倍推导
    pub max_tasks: i64,
    /// 候选Worker的心跳新鲜度窗口
    pub heartbeat_freshness: Duration,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_tasks: 0,
            heartbeat_freshness: Duration::seconds(60),
        }
    }
}

/// 任务分配引擎
///
/// 每轮扫描按优先级顺序遍历待调度任务，为每个任务找第一个资源
/// 放得下的Worker。没有匹配Worker的任务保留在pending，下一轮重新
/// 考虑，绝不降级到忽略资源约束的兜底分配。
pub struct AssignmentEngine {
    task_repo: Arc<dyn TaskRepository>,
    worker_repo: Arc<dyn WorkerRepository>,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<dyn MetricsSink>,
    config: AssignmentConfig,
}

impl AssignmentEngine {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        worker_repo: Arc<dyn WorkerRepository>,
        ledger: Arc<ResourceLedger>,
        metrics: Arc<dyn MetricsSink>,
        config: AssignmentConfig,
    ) -> Self {
        Self {
            task_repo,
            worker_repo,
            ledger,
            metrics,
            config,
        }
    }

    /// 执行一轮分配，返回成功配对的数量
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> SchedulerResult<usize> {
        let start = Instant::now();

        let mut candidates = self
            .worker_repo
            .list_available(self.config.heartbeat_freshness)
            .await?;
        if candidates.is_empty() {
            debug!("没有可用的Worker节点，跳过本轮分配");
            return Ok(0);
        }

        let limit = if self.config.max_tasks > 0 {
            self.config.max_tasks
        } else {
            (candidates.len() as i64) * 2
        };
        let pending = self.task_repo.list_pending(limit).await?;

        self.report_queue_depth(&pending);

        if pending.is_empty() {
            return Ok(0);
        }

        let mut assigned = 0;
        for task in pending {
            if candidates.is_empty() {
                break;
            }

            let mut fit_index = None;
            for (index, worker) in candidates.iter().enumerate() {
                if self.ledger.can_fit(worker, &task).await {
                    fit_index = Some(index);
                    break;
                }
            }

            let Some(index) = fit_index else {
                // 保留待调度，下一轮重试；队列深度指标会暴露积压
                debug!("任务 {} 暂无资源匹配的Worker，保留在队列", task.id);
                continue;
            };

            // 扫描快照与取消请求之间存在窗口，写入前重新确认状态
            match self.task_repo.get_by_id(&task.id).await {
                Ok(Some(current)) if current.status == TaskStatus::Pending => {}
                Ok(_) => {
                    debug!("任务 {} 已不在pending状态，跳过", task.id);
                    continue;
                }
                Err(e) => {
                    warn!("确认任务 {} 状态失败: {}", task.id, e);
                    continue;
                }
            }

            let worker = candidates[index].clone();

            let mut scheduled = task.clone();
            scheduled.status = TaskStatus::Scheduled;
            scheduled.worker_id = Some(worker.id.clone());
            if let Err(e) = self.task_repo.update(&scheduled).await {
                warn!("标记任务 {} 为scheduled失败，跳过该配对: {}", task.id, e);
                continue;
            }

            let mut busy = worker.clone();
            busy.status = WorkerStatus::Busy;
            busy.current_task_id = Some(task.id.clone());
            if let Err(e) = self.worker_repo.update(&busy).await {
                warn!("更新Worker {} 失败，回滚任务 {}: {}", worker.id, task.id, e);
                let mut reverted = task.clone();
                reverted.status = TaskStatus::Pending;
                reverted.worker_id = None;
                if let Err(e2) = self.task_repo.update(&reverted).await {
                    // 留给失联检测在两个心跳窗口内收敛
                    error!("回滚任务 {} 失败，等待失联检测回收: {}", task.id, e2);
                }
                candidates.remove(index);
                continue;
            }

            candidates.remove(index);
            self.ledger.commit(&worker.id, &task).await;
            self.metrics.record_assignment();
            info!("任务 {} 分配给Worker {}", task.id, worker.id);
            assigned += 1;
        }

        self.metrics
            .record_assignment_pass(start.elapsed().as_secs_f64());
        Ok(assigned)
    }

    fn report_queue_depth(&self, pending: &[aijob_domain::entities::Task]) {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        for task in pending {
            *depth.entry(task.model_name.as_str()).or_default() += 1;
        }
        for (model, count) in depth {
            self.metrics.record_queue_depth(model, count);
        }
    }
}
