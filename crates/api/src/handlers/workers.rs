use std::str::FromStr;

use axum::extract::{Path, Query, State};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use aijob_domain::entities::{Task, TaskStatus, WorkerInfo, WorkerStatus};

use crate::error::{ApiError, ApiResult};
use crate::response::{created, success};
use crate::routes::AppState;
use crate::validation::worker::{validate_worker_name, validate_worker_resources};

#[derive(Debug, Deserialize)]
pub struct RegisterWorkerRequest {
    pub name: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub available_memory: i64,
    #[serde(default)]
    pub available_cpu: f64,
    #[serde(default)]
    pub available_gpu: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkerStatusRequest {
    pub status: String,
    pub current_task_id: Option<String>,
    #[serde(default)]
    pub task_status: Option<String>,
    /// base64编码的任务输出
    #[serde(default)]
    pub task_output: Option<String>,
    #[serde(default)]
    pub task_error: Option<String>,
    #[serde(default)]
    pub available_memory: Option<i64>,
    #[serde(default)]
    pub available_cpu: Option<f64>,
    #[serde(default)]
    pub available_gpu: Option<f64>,
}

pub async fn register_worker(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<RegisterWorkerRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validate_worker_name(&req.name).map_err(|e| ApiError::Validation(e.code.to_string()))?;
    validate_worker_resources(req.available_cpu, req.available_memory, req.available_gpu)
        .map_err(|e| ApiError::Validation(e.code.to_string()))?;

    let mut worker = WorkerInfo::new(req.name, req.capabilities);
    worker.available_memory = req.available_memory;
    worker.available_cpu = req.available_cpu;
    worker.available_gpu = req.available_gpu;

    state.worker_repo.register(&worker).await?;
    info!(
        "注册Worker: {} (能力: {:?}, CPU: {}, GPU: {})",
        worker.id, worker.capabilities, worker.available_cpu, worker.available_gpu
    );

    Ok(created(worker))
}

pub async fn get_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    match state.worker_repo.get_by_id(&id).await? {
        Some(worker) => Ok(success(worker)),
        None => Err(ApiError::NotFound),
    }
}

#[derive(Debug, Deserialize)]
pub struct WorkerQueryParams {
    pub status: Option<String>,
}

pub async fn list_workers(
    State(state): State<AppState>,
    Query(params): Query<WorkerQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workers = match params.status.as_deref() {
        // available视图与调度器的候选集一致：心跳新鲜且未持有任务
        Some("available") => {
            state
                .worker_repo
                .list_available(state.heartbeat_freshness)
                .await?
        }
        Some(status) => {
            let status = WorkerStatus::from_str(status)
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            let all = state.worker_repo.list().await?;
            all.into_iter().filter(|w| w.status == status).collect()
        }
        None => state.worker_repo.list().await?,
    };
    Ok(success(workers))
}

/// 心跳：纯时间戳写入；离线Worker的心跳使其重新上线
pub async fn worker_heartbeat(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let worker = state
        .worker_repo
        .get_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if worker.status == WorkerStatus::Offline {
        let mut revived = worker;
        revived.status = WorkerStatus::Available;
        revived.current_task_id = None;
        revived.last_heartbeat = Utc::now();
        state.worker_repo.update(&revived).await?;
        info!("离线Worker {} 通过心跳恢复上线", id);
    } else {
        state.worker_repo.update_heartbeat(&id).await?;
    }

    state.metrics.record_heartbeat();
    Ok(success(()))
}

/// Worker组合状态上报：更新Worker自身状态与资源，并附带任务状态
///
/// 终态报告的幂等规则：引用的任务已是终态时丢弃报告并返回成功，
/// 这是调和超时竞态的唯一机制。
pub async fn update_worker_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<UpdateWorkerStatusRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let mut worker = state
        .worker_repo
        .get_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let reported_status = WorkerStatus::from_str(&req.status)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    worker.status = reported_status;
    worker.current_task_id = req.current_task_id.clone();
    worker.last_heartbeat = Utc::now();
    if let Some(memory) = req.available_memory {
        worker.available_memory = memory;
    }
    if let Some(cpu) = req.available_cpu {
        worker.available_cpu = cpu;
    }
    if let Some(gpu) = req.available_gpu {
        worker.available_gpu = gpu;
    }

    if let (Some(task_status), Some(task_id)) = (&req.task_status, &req.current_task_id) {
        let task_status = TaskStatus::from_str(task_status)
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        apply_task_report(&state, &mut worker, task_id, task_status, &req).await?;
    }

    state.worker_repo.update(&worker).await?;
    Ok(success(worker))
}

async fn apply_task_report(
    state: &AppState,
    worker: &mut WorkerInfo,
    task_id: &str,
    task_status: TaskStatus,
    req: &UpdateWorkerStatusRequest,
) -> Result<(), ApiError> {
    let Some(mut task) = state.task_repo.get_by_id(task_id).await? else {
        warn!("Worker {} 上报了不存在的任务 {}", worker.id, task_id);
        return Ok(());
    };

    // 任务已终态（超时清扫、孤儿回收或客户端取消抢先），丢弃报告
    if task.is_terminal() {
        debug!(
            "任务 {} 已是终态 {}，丢弃Worker {} 的 {} 报告",
            task.id, task.status, worker.id, task_status
        );
        worker.status = WorkerStatus::Available;
        worker.current_task_id = None;
        state.ledger.release(&worker.id, &task).await;
        return Ok(());
    }

    match task_status {
        TaskStatus::Running => {
            task.status = TaskStatus::Running;
            if task.started_at.is_none() {
                task.started_at = Some(Utc::now());
            }
            state.task_repo.update(&task).await?;
            debug!("任务 {} 开始在Worker {} 上运行", task.id, worker.id);
        }
        TaskStatus::Completed | TaskStatus::Failed => {
            apply_terminal_report(state, worker, &mut task, task_status, req).await?;
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "Worker不允许上报任务状态: {other}"
            )));
        }
    }

    Ok(())
}

async fn apply_terminal_report(
    state: &AppState,
    worker: &mut WorkerInfo,
    task: &mut Task,
    task_status: TaskStatus,
    req: &UpdateWorkerStatusRequest,
) -> Result<(), ApiError> {
    task.status = task_status;
    task.completed_at = Some(Utc::now());
    if let Some(output) = &req.task_output {
        task.output = BASE64
            .decode(output)
            .map_err(|e| ApiError::BadRequest(format!("任务输出不是合法的base64: {e}")))?;
    }
    if let Some(error) = &req.task_error {
        task.error = error.clone();
    }

    // 先写任务终态，再清理Worker占用
    state.task_repo.update(task).await?;
    state.metrics.record_task_terminal(task_status);

    worker.total_tasks_handled += 1;
    worker.current_task_id = None;
    worker.status = WorkerStatus::Available;
    state.ledger.release(&worker.id, task).await;

    info!(
        "任务 {} 在Worker {} 上结束，状态: {}",
        task.id, worker.id, task_status
    );
    Ok(())
}
