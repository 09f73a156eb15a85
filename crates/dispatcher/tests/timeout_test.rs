use std::sync::Arc;

use aijob_dispatcher::{ResourceLedger, TimeoutSweeper};
use aijob_domain::entities::{TaskStatus, WorkerStatus};
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_infrastructure::{MemoryTaskRepository, MemoryWorkerRepository};
use aijob_testing_utils::{RecordingMetricsSink, TaskBuilder, WorkerBuilder};

struct Harness {
    task_repo: Arc<MemoryTaskRepository>,
    worker_repo: Arc<MemoryWorkerRepository>,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<RecordingMetricsSink>,
    sweeper: TimeoutSweeper,
}

fn harness(ceiling_seconds: i64) -> Harness {
    let task_repo = Arc::new(MemoryTaskRepository::new());
    let worker_repo = Arc::new(MemoryWorkerRepository::new());
    let ledger = Arc::new(ResourceLedger::new());
    let metrics = Arc::new(RecordingMetricsSink::new());
    let sweeper = TimeoutSweeper::new(
        task_repo.clone(),
        worker_repo.clone(),
        ledger.clone(),
        metrics.clone(),
        ceiling_seconds,
    );
    Harness {
        task_repo,
        worker_repo,
        ledger,
        metrics,
        sweeper,
    }
}

#[tokio::test]
async fn test_expired_task_fails_and_frees_worker() {
    let h = harness(1800);

    let task = TaskBuilder::new()
        .with_model("m")
        .with_status(TaskStatus::Running)
        .with_timeout(60)
        .started_seconds_ago(61)
        .build();
    let worker = WorkerBuilder::new().with_current_task(&task.id).build();
    let task = {
        let mut t = task;
        t.worker_id = Some(worker.id.clone());
        t
    };

    h.task_repo.create(&task).await.unwrap();
    h.worker_repo.register(&worker).await.unwrap();
    h.ledger.commit(&worker.id, &task).await;

    assert_eq!(h.sweeper.run_once().await.unwrap(), 1);

    let failed = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.error, "任务执行超时");
    assert!(failed.completed_at.is_some());

    let freed = h.worker_repo.get_by_id(&worker.id).await.unwrap().unwrap();
    assert_eq!(freed.status, WorkerStatus::Available);
    assert!(freed.current_task_id.is_none());

    assert!(h.ledger.snapshot(&worker.id).await.is_zero());
    assert_eq!(h.metrics.count("task_timeout"), 1);
}

#[tokio::test]
async fn test_task_within_deadline_untouched() {
    let h = harness(1800);

    let task = TaskBuilder::new()
        .with_status(TaskStatus::Running)
        .with_timeout(300)
        .started_seconds_ago(100)
        .build();
    h.task_repo.create(&task).await.unwrap();

    assert_eq!(h.sweeper.run_once().await.unwrap(), 0);
    let untouched = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, TaskStatus::Running);
}

#[tokio::test]
async fn test_scheduler_ceiling_caps_task_timeout() {
    // 任务自带1小时超时，但调度器上限是120秒
    let h = harness(120);

    let task = TaskBuilder::new()
        .with_status(TaskStatus::Running)
        .with_timeout(3600)
        .started_seconds_ago(200)
        .build();
    h.task_repo.create(&task).await.unwrap();

    assert_eq!(h.sweeper.run_once().await.unwrap(), 1);
    let failed = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_running_without_started_at_is_skipped() {
    let h = harness(1800);

    let task = TaskBuilder::new()
        .with_status(TaskStatus::Running)
        .with_timeout(1)
        .build();
    h.task_repo.create(&task).await.unwrap();

    assert_eq!(h.sweeper.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweeps_beyond_one_batch() {
    let h = harness(1800);

    // 超过单批100的运行中任务全部被扫到
    for i in 0..120 {
        let task = TaskBuilder::new()
            .with_name(&format!("t{i}"))
            .with_status(TaskStatus::Running)
            .with_timeout(10)
            .started_seconds_ago(100 + i)
            .build();
        h.task_repo.create(&task).await.unwrap();
    }

    assert_eq!(h.sweeper.run_once().await.unwrap(), 120);
    assert_eq!(
        h.task_repo.count_by_status(TaskStatus::Failed).await.unwrap(),
        120
    );
}

#[tokio::test]
async fn test_repeated_sweep_is_noop() {
    let h = harness(1800);

    let task = TaskBuilder::new()
        .with_status(TaskStatus::Running)
        .with_timeout(30)
        .started_seconds_ago(60)
        .build();
    h.task_repo.create(&task).await.unwrap();

    assert_eq!(h.sweeper.run_once().await.unwrap(), 1);
    assert_eq!(h.sweeper.run_once().await.unwrap(), 0);
    assert_eq!(h.metrics.count("task_timeout"), 1);
}
