//! 跨组件的调度流程测试：孤儿回收与重新分配的完整链路、
//! 账本重建、调度循环的启动与关闭。

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::broadcast;

use aijob_dispatcher::{
    AssignmentConfig, AssignmentEngine, LivenessMonitor, ResourceLedger, SchedulerController,
    SchedulerLoopConfig, TimeoutSweeper,
};
use aijob_domain::entities::{TaskStatus, WorkerInfo, WorkerStatus};
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_infrastructure::{MemoryTaskRepository, MemoryWorkerRepository};
use aijob_testing_utils::{RecordingMetricsSink, TaskBuilder, WorkerBuilder};

struct Harness {
    task_repo: Arc<MemoryTaskRepository>,
    worker_repo: Arc<MemoryWorkerRepository>,
    ledger: Arc<ResourceLedger>,
    engine: AssignmentEngine,
    monitor: LivenessMonitor,
}

fn harness() -> Harness {
    let task_repo = Arc::new(MemoryTaskRepository::new());
    let worker_repo = Arc::new(MemoryWorkerRepository::new());
    let ledger = Arc::new(ResourceLedger::new());
    let metrics = Arc::new(RecordingMetricsSink::new());

    let engine = AssignmentEngine::new(
        task_repo.clone(),
        worker_repo.clone(),
        ledger.clone(),
        metrics.clone(),
        AssignmentConfig {
            max_tasks: 100,
            heartbeat_freshness: Duration::seconds(60),
        },
    );
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
        engine,
        monitor,
    }
}

async fn make_stale(worker_repo: &Arc<MemoryWorkerRepository>, worker_id: &str) {
    let mut worker = worker_repo.get_by_id(worker_id).await.unwrap().unwrap();
    worker.last_heartbeat = Utc::now() - Duration::seconds(120);
    worker_repo.update(&worker).await.unwrap();
}

async fn register_fresh(worker_repo: &Arc<MemoryWorkerRepository>, name: &str) -> WorkerInfo {
    let worker = WorkerBuilder::new()
        .with_name(name)
        .with_capabilities(&["m"])
        .build();
    worker_repo.register(&worker).await.unwrap();
    worker
}

#[tokio::test]
async fn test_orphan_retry_until_budget_exhaustion() {
    let h = harness();

    let task = TaskBuilder::new().with_model("m").with_max_retries(2).build();
    h.task_repo.create(&task).await.unwrap();

    // 第一次分配并孤儿化
    let w1 = register_fresh(&h.worker_repo, "w1").await;
    assert_eq!(h.engine.run_once().await.unwrap(), 1);
    make_stale(&h.worker_repo, &w1.id).await;
    h.monitor.run_once().await.unwrap();

    let after_first = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(after_first.status, TaskStatus::Pending);
    assert_eq!(after_first.retry_count, 1);
    assert_eq!(
        h.worker_repo.get_by_id(&w1.id).await.unwrap().unwrap().status,
        WorkerStatus::Offline
    );

    // 新Worker接手后再次孤儿化
    let w2 = register_fresh(&h.worker_repo, "w2").await;
    assert_eq!(h.engine.run_once().await.unwrap(), 1);
    let assigned = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(assigned.worker_id, Some(w2.id.clone()));
    make_stale(&h.worker_repo, &w2.id).await;
    h.monitor.run_once().await.unwrap();

    let after_second = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(after_second.status, TaskStatus::Pending);
    assert_eq!(after_second.retry_count, 2);

    // 预算耗尽，第三次孤儿化后终止
    let w3 = register_fresh(&h.worker_repo, "w3").await;
    assert_eq!(h.engine.run_once().await.unwrap(), 1);
    make_stale(&h.worker_repo, &w3.id).await;
    h.monitor.run_once().await.unwrap();

    let finished = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(finished.status, TaskStatus::Failed);
    assert_eq!(finished.retry_count, 2);
    assert!(finished.error.contains("重试预算耗尽"));

    // 终态后不再被任何分配扫描拾起
    let _w4 = register_fresh(&h.worker_repo, "w4").await;
    assert_eq!(h.engine.run_once().await.unwrap(), 0);
    let untouched = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, TaskStatus::Failed);
}

#[tokio::test]
async fn test_ledger_rebuild_from_store() {
    let h = harness();

    let worker = register_fresh(&h.worker_repo, "w1").await;
    let task = TaskBuilder::new().with_model("m").build();
    h.task_repo.create(&task).await.unwrap();
    assert_eq!(h.engine.run_once().await.unwrap(), 1);

    // 模拟进程重启：新账本从存储重建
    let fresh_ledger = Arc::new(ResourceLedger::new());
    let task_repo: Arc<dyn TaskRepository> = h.task_repo.clone();
    let worker_repo: Arc<dyn WorkerRepository> = h.worker_repo.clone();
    let rebuilt = fresh_ledger
        .rebuild(&task_repo, &worker_repo)
        .await
        .unwrap();

    assert_eq!(rebuilt, 1);
    let snapshot = fresh_ledger.snapshot(&worker.id).await;
    assert_eq!(snapshot.cpu_cores, 1.0);
    assert!((snapshot.gpu_fraction - 0.7).abs() < 1e-9);

    // 重建后的账本拒绝放不下的新任务
    let another = TaskBuilder::new().with_model("m").build();
    let stored_worker = h.worker_repo.get_by_id(&worker.id).await.unwrap().unwrap();
    assert!(!fresh_ledger.can_fit(&stored_worker, &another).await);
}

#[tokio::test]
async fn test_controller_assigns_and_shuts_down() {
    let h = harness();
    let metrics = Arc::new(RecordingMetricsSink::new());

    register_fresh(&h.worker_repo, "w1").await;
    let task = TaskBuilder::new().with_model("m").build();
    h.task_repo.create(&task).await.unwrap();

    let engine = AssignmentEngine::new(
        h.task_repo.clone(),
        h.worker_repo.clone(),
        h.ledger.clone(),
        metrics.clone(),
        AssignmentConfig::default(),
    );
    let monitor = LivenessMonitor::new(
        h.task_repo.clone(),
        h.worker_repo.clone(),
        h.ledger.clone(),
        metrics.clone(),
        Duration::seconds(30),
    );
    let sweeper = TimeoutSweeper::new(
        h.task_repo.clone(),
        h.worker_repo.clone(),
        h.ledger.clone(),
        metrics.clone(),
        1800,
    );
    let controller = SchedulerController::new(
        engine,
        monitor,
        sweeper,
        SchedulerLoopConfig {
            poll_interval: StdDuration::from_millis(20),
            heartbeat_interval: StdDuration::from_millis(500),
        },
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
    let handle = tokio::spawn(async move { controller.run(shutdown_rx).await });

    // 等第一轮分配发生
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    let scheduled = h.task_repo.get_by_id(&task.id).await.unwrap().unwrap();
    assert_eq!(scheduled.status, TaskStatus::Scheduled);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(StdDuration::from_secs(2), handle)
        .await
        .expect("调度循环应在关闭信号后及时退出")
        .unwrap();
}
