use std::collections::HashMap;

use axum::extract::State;
use serde::Serialize;

use aijob_domain::entities::{TaskStatus, WorkerStatus};

use crate::error::ApiResult;
use crate::response::success;
use crate::routes::AppState;

#[derive(Debug, Serialize)]
pub struct WorkerLedgerSnapshot {
    pub worker_id: String,
    pub committed_cpu: f64,
    pub committed_memory_bytes: i64,
    pub committed_gpu: f64,
}

#[derive(Debug, Serialize)]
pub struct SystemStatsResponse {
    pub tasks: HashMap<String, i64>,
    pub workers: HashMap<String, i64>,
    pub ledger: Vec<WorkerLedgerSnapshot>,
}

/// 系统概览：按状态的任务/Worker计数与账本快照
pub async fn get_system_stats(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let mut tasks = HashMap::new();
    for status in TaskStatus::ALL {
        let count = state.task_repo.count_by_status(status).await?;
        tasks.insert(status.as_str().to_string(), count);
    }

    let all_workers = state.worker_repo.list().await?;
    let mut workers: HashMap<String, i64> = WorkerStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    for worker in &all_workers {
        *workers.entry(worker.status.as_str().to_string()).or_default() += 1;
    }

    let mut ledger = Vec::new();
    for worker in &all_workers {
        let snapshot = state.ledger.snapshot(&worker.id).await;
        if !snapshot.is_zero() {
            ledger.push(WorkerLedgerSnapshot {
                worker_id: worker.id.clone(),
                committed_cpu: snapshot.cpu_cores,
                committed_memory_bytes: snapshot.memory_bytes,
                committed_gpu: snapshot.gpu_fraction,
            });
        }
    }

    Ok(success(SystemStatsResponse {
        tasks,
        workers,
        ledger,
    }))
}
