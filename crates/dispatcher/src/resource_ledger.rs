use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use aijob_domain::entities::{Task, WorkerInfo};
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_errors::SchedulerResult;

const GIB: i64 = 1024 * 1024 * 1024;

/// 单个任务的资源需求
///
/// 需求推导是确定性的：带模型标签的任务按大档位计，空标签按小档位计。
/// 内存以字节为单位。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TaskResources {
    pub cpu_cores: f64,
    pub memory_bytes: i64,
    pub gpu_fraction: f64,
}

impl TaskResources {
    pub fn for_task(task: &Task) -> Self {
        if task.model_name.is_empty() {
            Self {
                cpu_cores: 0.5,
                memory_bytes: GIB,
                gpu_fraction: 0.3,
            }
        } else {
            Self {
                cpu_cores: 1.0,
                memory_bytes: 2 * GIB,
                gpu_fraction: 0.7,
            }
        }
    }

    fn add(&mut self, other: &TaskResources) {
        self.cpu_cores += other.cpu_cores;
        self.memory_bytes += other.memory_bytes;
        self.gpu_fraction += other.gpu_fraction;
    }

    fn subtract_saturating(&mut self, other: &TaskResources) {
        self.cpu_cores = (self.cpu_cores - other.cpu_cores).max(0.0);
        self.memory_bytes = (self.memory_bytes - other.memory_bytes).max(0);
        self.gpu_fraction = (self.gpu_fraction - other.gpu_fraction).max(0.0);
    }

    pub fn is_zero(&self) -> bool {
        self.cpu_cores == 0.0 && self.memory_bytes == 0 && self.gpu_fraction == 0.0
    }
}

/// 进程内资源账本
///
/// 记录每个Worker已承诺的CPU/内存/GPU总量。账本是缓存而非事实源：
/// 进程重启后通过 `rebuild` 从存储重建，丢失可恢复。
/// 读用共享锁，提交/释放用独占锁。
#[derive(Debug, Default)]
pub struct ResourceLedger {
    commitments: RwLock<HashMap<String, TaskResources>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worker能否再容纳一个任务：能力标签匹配且三个维度都不超过声明容量
    pub async fn can_fit(&self, worker: &WorkerInfo, task: &Task) -> bool {
        if !worker.supports_model(&task.model_name) {
            return false;
        }

        let required = TaskResources::for_task(task);
        let commitments = self.commitments.read().await;
        let committed = commitments
            .get(&worker.id)
            .copied()
            .unwrap_or_default();

        committed.cpu_cores + required.cpu_cores <= worker.available_cpu
            && committed.memory_bytes + required.memory_bytes <= worker.available_memory
            && committed.gpu_fraction + required.gpu_fraction <= worker.available_gpu
    }

    /// 只在分配的存储写入成功后调用
    pub async fn commit(&self, worker_id: &str, task: &Task) {
        let required = TaskResources::for_task(task);
        let mut commitments = self.commitments.write().await;
        commitments
            .entry(worker_id.to_string())
            .or_default()
            .add(&required);
        debug!(
            "账本提交: worker={} task={} cpu={} mem={} gpu={}",
            worker_id, task.id, required.cpu_cores, required.memory_bytes, required.gpu_fraction
        );
    }

    /// 任务终态、孤儿回收、超时回收路径都必须调用；重复释放饱和到零
    pub async fn release(&self, worker_id: &str, task: &Task) {
        let required = TaskResources::for_task(task);
        let mut commitments = self.commitments.write().await;
        if let Some(committed) = commitments.get_mut(worker_id) {
            committed.subtract_saturating(&required);
            if committed.is_zero() {
                commitments.remove(worker_id);
            }
            debug!("账本释放: worker={} task={}", worker_id, task.id);
        }
    }

    /// 仅供观测使用
    pub async fn snapshot(&self, worker_id: &str) -> TaskResources {
        let commitments = self.commitments.read().await;
        commitments
            .get(worker_id)
            .copied()
            .unwrap_or_default()
    }

    /// 进程启动时从存储重建：遍历所有持有任务的Worker，按其任务重新提交
    pub async fn rebuild(
        &self,
        task_repo: &Arc<dyn TaskRepository>,
        worker_repo: &Arc<dyn WorkerRepository>,
    ) -> SchedulerResult<usize> {
        let workers = worker_repo.list().await?;
        let mut rebuilt = 0;

        {
            let mut commitments = self.commitments.write().await;
            commitments.clear();
        }

        for worker in workers {
            let Some(task_id) = &worker.current_task_id else {
                continue;
            };
            match task_repo.get_by_id(task_id).await? {
                Some(task) if task.is_dispatched() => {
                    self.commit(&worker.id, &task).await;
                    rebuilt += 1;
                }
                Some(task) => {
                    debug!(
                        "重建账本时跳过非调度中任务: worker={} task={} status={}",
                        worker.id, task.id, task.status
                    );
                }
                None => {
                    warn!(
                        "重建账本时Worker {} 引用的任务 {} 不存在",
                        worker.id, task_id
                    );
                }
            }
        }

        debug!("账本重建完成，恢复 {} 条资源承诺", rebuilt);
        Ok(rebuilt)
    }
}
