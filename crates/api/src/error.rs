use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use aijob_errors::SchedulerError;

/// API错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("未找到资源")]
    NotFound,

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { .. })
            | ApiError::Scheduler(SchedulerError::WorkerNotFound { .. }) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            ApiError::Scheduler(SchedulerError::TaskAlreadyExists { .. })
            | ApiError::Scheduler(SchedulerError::WorkerAlreadyExists { .. }) => {
                (StatusCode::CONFLICT, self.to_string())
            }
            ApiError::Scheduler(SchedulerError::InvalidTaskParams(_))
            | ApiError::Scheduler(SchedulerError::ValidationError(_))
            | ApiError::Scheduler(SchedulerError::InvalidStateTransition { .. }) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::Scheduler(SchedulerError::McpService(_)) => {
                (StatusCode::BAD_GATEWAY, self.to_string())
            }
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Serialization(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "资源未找到".to_string()),
            ApiError::Scheduler(_) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "内部服务器错误".to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "code": status.as_u16()
            }
        }));

        (status, body).into_response()
    }
}

/// API结果类型
pub type ApiResult<T> = Result<T, ApiError>;
