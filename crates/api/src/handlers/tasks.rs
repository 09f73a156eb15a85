use std::str::FromStr;

use axum::extract::{Path, Query, State};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use aijob_domain::entities::{Task, TaskPriority, TaskStatus};
use aijob_domain::repositories::TaskFilter;

use crate::error::{ApiError, ApiResult};
use crate::response::{created, success};
use crate::routes::AppState;
use crate::validation::task::{validate_model_name, validate_task_limits, validate_task_name};

const DEFAULT_LIST_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub priority: TaskPriority,
    /// base64编码的不透明输入负载
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub user_id: String,
    pub timeout: Option<i64>,
    pub max_retries: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub model_name: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub input: String,
    pub output: String,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub worker_id: Option<String>,
    pub user_id: String,
    pub timeout_seconds: i64,
    pub retry_count: i32,
    pub max_retries: i32,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            name: task.name,
            description: task.description,
            model_name: task.model_name,
            status: task.status,
            priority: task.priority,
            input: BASE64.encode(&task.input),
            output: BASE64.encode(&task.output),
            error: task.error,
            created_at: task.created_at,
            updated_at: task.updated_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            worker_id: task.worker_id,
            user_id: task.user_id,
            timeout_seconds: task.timeout_seconds,
            retry_count: task.retry_count,
            max_retries: task.max_retries,
        }
    }
}

pub async fn create_task(
    State(state): State<AppState>,
    axum::Json(req): axum::Json<CreateTaskRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    validate_task_name(&req.name).map_err(|e| ApiError::Validation(e.code.to_string()))?;
    validate_model_name(&req.model_name)
        .map_err(|e| ApiError::Validation(e.code.to_string()))?;
    validate_task_limits(req.timeout, req.max_retries)
        .map_err(|e| ApiError::Validation(e.code.to_string()))?;

    let input = BASE64
        .decode(&req.input)
        .map_err(|e| ApiError::BadRequest(format!("输入负载不是合法的base64: {e}")))?;

    let mut task = Task::new(req.name, req.model_name, req.user_id, req.priority, input);
    task.description = req.description;
    if let Some(timeout) = req.timeout {
        task.timeout_seconds = timeout;
    }
    if let Some(max_retries) = req.max_retries {
        task.max_retries = max_retries;
    }

    state.task_repo.create(&task).await?;
    info!("接受新任务: {} (模型: {:?})", task.id, task.model_name);

    Ok(created(TaskResponse::from(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    match state.task_repo.get_by_id(&id).await? {
        Some(task) => Ok(success(TaskResponse::from(task))),
        None => Err(ApiError::NotFound),
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(TaskStatus::from_str)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let filter = TaskFilter {
        status,
        limit: Some(params.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000)),
        ..Default::default()
    };
    let tasks = state.task_repo.list(&filter).await?;
    let responses: Vec<TaskResponse> = tasks.into_iter().map(TaskResponse::from).collect();
    Ok(success(responses))
}

/// 取消任务：只允许pending/scheduled，运行中任务需等待完成或超时
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let mut task = state
        .task_repo
        .get_by_id(&id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if !task.is_cancellable() {
        return Err(ApiError::BadRequest(format!(
            "无法取消状态为 {} 的任务",
            task.status
        )));
    }

    task.status = TaskStatus::Cancelled;
    state.task_repo.update(&task).await?;
    state.metrics.record_task_terminal(TaskStatus::Cancelled);
    info!("任务 {} 已被客户端取消", task.id);

    Ok(success(TaskResponse::from(task)))
}
