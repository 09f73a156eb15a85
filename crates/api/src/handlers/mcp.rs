//! MCP透传入口
//!
//! 上下文操作转发到配置的MCP服务；每次操作通过任务存储落一条
//! 终态的记账任务，让MCP流量与普通任务共享同一套计数与指标。
//! 流式提示路径绕过任务载荷，但同样落记账任务。

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use aijob_domain::entities::{Task, TaskPriority, TaskStatus};
use aijob_domain::repositories::TaskFilter;

use crate::error::{ApiError, ApiResult};
use crate::handlers::tasks::TaskResponse;
use crate::mcp_client::McpClient;
use crate::response::{created, success};
use crate::routes::AppState;

const MCP_TASK_PREFIX: &str = "mcp:";
const MCP_USER_ID: &str = "mcp-gateway";

#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(default)]
    pub stream: bool,
    #[serde(flatten)]
    pub body: Value,
}

fn mcp_client(state: &AppState) -> Result<&McpClient, ApiError> {
    state
        .mcp
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("MCP透传未启用".to_string()))
}

/// 落一条终态的记账任务；记账失败只告警，不影响透传结果
async fn record_bookkeeping_task(
    state: &AppState,
    operation: &str,
    model_name: &str,
    input: &Value,
    outcome: Result<&Value, &ApiError>,
) {
    let mut task = Task::new(
        format!("{MCP_TASK_PREFIX}{operation}"),
        model_name,
        MCP_USER_ID,
        TaskPriority::Normal,
        input.to_string().into_bytes(),
    );
    let now = Utc::now();
    task.started_at = Some(now);
    task.completed_at = Some(now);
    match outcome {
        Ok(output) => {
            task.status = TaskStatus::Completed;
            task.output = output.to_string().into_bytes();
        }
        Err(e) => {
            task.status = TaskStatus::Failed;
            task.error = e.to_string();
        }
    }

    let status = task.status;
    if let Err(e) = state.task_repo.create(&task).await {
        warn!("记录MCP记账任务失败: {}", e);
    } else {
        state.metrics.record_task_terminal(status);
    }
}

pub async fn create_context(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<Value>,
) -> ApiResult<impl IntoResponse> {
    let client = mcp_client(&state)?;
    let model_name = body
        .get("model_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let result = client
        .create_context(&body)
        .await
        .map_err(ApiError::Scheduler);
    record_bookkeeping_task(
        &state,
        "create_context",
        &model_name,
        &body,
        result.as_ref(),
    )
    .await;

    let output = result?;
    info!("MCP上下文创建完成");
    Ok(created(output))
}

pub async fn delete_context(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let client = mcp_client(&state)?;
    let input = serde_json::json!({ "context_id": id });

    let result = client.delete_context(&id).await.map_err(ApiError::Scheduler);
    record_bookkeeping_task(&state, "delete_context", "", &input, result.as_ref()).await;

    Ok(success(result?))
}

pub async fn prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    axum::Json(req): axum::Json<PromptRequest>,
) -> ApiResult<Response> {
    let client = mcp_client(&state)?;

    if req.stream {
        // SSE原样转发；载荷不经过任务分发，但仍落记账任务
        let upstream = client
            .stream_prompt(&id, &req.body)
            .await
            .map_err(ApiError::Scheduler);

        let streamed = serde_json::json!({ "streamed": true });
        record_bookkeeping_task(
            &state,
            "add_prompt",
            "",
            &req.body,
            result_as_value(&upstream, &streamed),
        )
        .await;

        let upstream = upstream?;
        let body = Body::from_stream(upstream.bytes_stream());
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .body(body)
            .map_err(|e| ApiError::Internal(format!("构建SSE响应失败: {e}")));
    }

    let result = client
        .add_prompt(&id, &req.body)
        .await
        .map_err(ApiError::Scheduler);
    record_bookkeeping_task(&state, "add_prompt", "", &req.body, result.as_ref()).await;

    Ok(success(result?).into_response())
}

fn result_as_value<'a, T>(
    result: &'a Result<T, ApiError>,
    placeholder: &'a Value,
) -> Result<&'a Value, &'a ApiError> {
    match result {
        Ok(_) => Ok(placeholder),
        Err(e) => Err(e),
    }
}

pub async fn list_mcp_tasks(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    let filter = TaskFilter {
        user_id: Some(MCP_USER_ID.to_string()),
        limit: Some(100),
        ..Default::default()
    };
    let tasks = state.task_repo.list(&filter).await?;
    let responses: Vec<TaskResponse> = tasks.into_iter().map(TaskResponse::from).collect();
    Ok(success(responses))
}

pub async fn get_mcp_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    match state.task_repo.get_by_id(&id).await? {
        Some(task) if task.user_id == MCP_USER_ID => Ok(success(TaskResponse::from(task))),
        _ => Err(ApiError::NotFound),
    }
}
