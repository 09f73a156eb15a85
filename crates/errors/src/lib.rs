use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: String },
    #[error("任务已存在: {id}")]
    TaskAlreadyExists { id: String },
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("Worker已存在: {id}")]
    WorkerAlreadyExists { id: String },
    #[error("无效的状态转换: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("无效的任务参数: {0}")]
    InvalidTaskParams(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("MCP服务错误: {0}")]
    McpService(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("资源不足: {0}")]
    ResourceExhausted(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn task_not_found<S: Into<String>>(id: S) -> Self {
        Self::TaskNotFound { id: id.into() }
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn invalid_params<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTaskParams(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::Internal(_) | SchedulerError::Configuration(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_)
                | SchedulerError::DatabaseOperation(_)
                | SchedulerError::Network(_)
                | SchedulerError::Timeout(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            SchedulerError::TaskNotFound { .. } => "请求的任务不存在",
            SchedulerError::WorkerNotFound { .. } => "请求的Worker节点不存在",
            SchedulerError::TaskAlreadyExists { .. } => "任务已存在",
            SchedulerError::WorkerAlreadyExists { .. } => "Worker节点已存在",
            SchedulerError::InvalidStateTransition { .. } => "当前状态下不允许该操作",
            SchedulerError::InvalidTaskParams(_) => "任务参数配置有误",
            SchedulerError::ValidationError(_) => "输入数据验证失败",
            SchedulerError::Timeout(_) => "操作超时，请稍后重试",
            SchedulerError::ResourceExhausted(_) => "系统资源不足，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchedulerError::task_not_found("t-123");
        assert_eq!(err.to_string(), "任务未找到: t-123");

        let err = SchedulerError::InvalidStateTransition {
            from: "running".to_string(),
            to: "cancelled".to_string(),
        };
        assert_eq!(err.to_string(), "无效的状态转换: running -> cancelled");
    }

    #[test]
    fn test_is_retryable() {
        assert!(SchedulerError::database_error("connection reset").is_retryable());
        assert!(SchedulerError::Network("dns".to_string()).is_retryable());
        assert!(!SchedulerError::task_not_found("t-1").is_retryable());
        assert!(!SchedulerError::validation_error("bad name").is_retryable());
    }

    #[test]
    fn test_user_message() {
        assert_eq!(
            SchedulerError::worker_not_found("w-1").user_message(),
            "请求的Worker节点不存在"
        );
        assert_eq!(
            SchedulerError::Internal("oops".to_string()).user_message(),
            "系统繁忙，请稍后重试"
        );
    }
}
