use std::sync::Arc;

use chrono::Duration;

use aijob_dispatcher::{LivenessMonitor, ResourceLedger};
use aijob_domain::entities::{TaskStatus, WorkerStatus};
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_infrastructure::{MemoryTaskRepository, MemoryWorkerRepository};
use aijob_testing_utils::{RecordingMetricsSink, TaskBuilder, WorkerBuilder};

struct Harness {
    task_repo: Arc<MemoryTaskRepository>,
    worker_repo: Arc<MemoryWorkerRepository>,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<RecordingMetricsSink>,
    monitor: LivenessMonitor,
}

fn harness() -> Harness {
    let task_repo = Arc::new(MemoryTaskRepository::new());
    let worker_repo = Arc::new(MemoryWorkerRepository::new());
    let ledger = Arc::new(ResourceLedger::new());
    let metrics = Arc::new(RecordingMetricsSink::new());
    let monitor = LivenessMonitor::new(
        task_repo.clone(),
        worker_repo.clone(),
        ledger.clone(),
        metrics.clone(),
        Duration::seconds(30),
    );
    Harness {
        task_repo,
        worker_repo,
        ledger,
        metrics,
        monitor,
    }
}

#[tokio::test]
async fn test_orphan_requeued_within_budget() {
    let h = harness();

    let task = TaskBuilder::new()
        .with_model("m")
        .with_status(TaskStatus::Running)
        .with_max_retries(2)
        .started_seconds_ago(100)
        .build();
    let worker = WorkerBuilder::new()
        .with_current_task(&task.id)
        .heartbeat_seconds_ago(120)
        .build();
    let task = {
        let mut t = task;
        t.worker_id = Some(worker.id.clone());
        t
    };

    h.task_repo.create(&task).await.unwrap();
    h.worker_repo.register(&worker).await.unwrap();
    h.ledger.commit(&worker.id, &task).await;

    assert_eq!(h.monitor.run_once().await.unwrap(), 1);

    let requeued = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(requeued.status, TaskStatus::Pending);
    assert_eq!(requeued.retry_count, 1);
    assert!(requeued.worker_id.is_none());
    assert!(requeued.started_at.is_none());

    let offline = h.worker_repo.get_by_id(&worker.id).await.unwrap().unwrap();
    assert_eq!(offline.status, WorkerStatus::Offline);
    assert!(offline.current_task_id.is_none());

    assert!(h.ledger.snapshot(&worker.id).await.is_zero());
    assert_eq!(h.metrics.count("task_retry"), 1);
    assert_eq!(h.metrics.count("worker_offline"), 1);
}

#[tokio::test]
async fn test_orphan_fails_when_budget_exhausted() {
    let h = harness();

    let task = TaskBuilder::new()
        .with_status(TaskStatus::Scheduled)
        .with_max_retries(2)
        .with_retry_count(2)
        .build();
    let worker = WorkerBuilder::new()
        .with_current_task(&task.id)
        .heartbeat_seconds_ago(90)
        .build();
    let task = {
        let mut t = task;
        t.worker_id = Some(worker.id.clone());
        t
    };

    h.task_repo.create(&task).await.unwrap();
    h.worker_repo.register(&worker).await.unwrap();

    h.monitor.run_once().await.unwrap();

    let failed = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.retry_count, 2);
    assert!(failed.error.contains("重试预算耗尽"));
    assert!(failed.completed_at.is_some());
}

#[tokio::test]
async fn test_fresh_worker_not_touched() {
    let h = harness();

    // 阈值是 2 × 30s，50秒前的心跳还在窗口内
    let worker = WorkerBuilder::new().heartbeat_seconds_ago(50).build();
    h.worker_repo.register(&worker).await.unwrap();

    assert_eq!(h.monitor.run_once().await.unwrap(), 0);
    let untouched = h.worker_repo.get_by_id(&worker.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, WorkerStatus::Available);
}

#[tokio::test]
async fn test_repeated_runs_are_idempotent() {
    let h = harness();

    let task = TaskBuilder::new()
        .with_status(TaskStatus::Running)
        .with_max_retries(3)
        .started_seconds_ago(10)
        .build();
    let worker = WorkerBuilder::new()
        .with_current_task(&task.id)
        .heartbeat_seconds_ago(300)
        .build();
    let task = {
        let mut t = task;
        t.worker_id = Some(worker.id.clone());
        t
    };

    h.task_repo.create(&task).await.unwrap();
    h.worker_repo.register(&worker).await.unwrap();

    assert_eq!(h.monitor.run_once().await.unwrap(), 1);
    let after_first = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();

    // 第二轮对同一个已离线Worker必须是无操作
    assert_eq!(h.monitor.run_once().await.unwrap(), 0);
    let after_second = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_first.retry_count, after_second.retry_count);
    assert_eq!(h.metrics.count("worker_offline"), 1);
    assert_eq!(h.metrics.count("task_retry"), 1);
}

#[tokio::test]
async fn test_stale_worker_without_task() {
    let h = harness();

    let worker = WorkerBuilder::new().heartbeat_seconds_ago(180).build();
    h.worker_repo.register(&worker).await.unwrap();

    assert_eq!(h.monitor.run_once().await.unwrap(), 1);
    let offline = h.worker_repo.get_by_id(&worker.id).await.unwrap().unwrap();
    assert_eq!(offline.status, WorkerStatus::Offline);
}

#[tokio::test]
async fn test_terminal_task_on_stale_worker_releases_ledger_only() {
    let h = harness();

    // 任务在scheduled阶段被客户端取消，Worker随后失联
    let task = TaskBuilder::new()
        .with_model("m")
        .with_status(TaskStatus::Cancelled)
        .build();
    let worker = WorkerBuilder::new()
        .with_current_task(&task.id)
        .heartbeat_seconds_ago(120)
        .build();

    h.task_repo.create(&task).await.unwrap();
    h.worker_repo.register(&worker).await.unwrap();
    h.ledger.commit(&worker.id, &task).await;

    assert_eq!(h.monitor.run_once().await.unwrap(), 1);

    let unchanged = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, TaskStatus::Cancelled);
    assert_eq!(unchanged.retry_count, 0);
    assert!(h.ledger.snapshot(&worker.id).await.is_zero());
}
