use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务默认超时时间（30分钟）
pub const DEFAULT_TASK_TIMEOUT_SECONDS: i64 = 1800;
/// 任务默认最大重试次数
pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// 终态任务不允许再次变更状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Scheduled,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];
}

impl std::str::FromStr for TaskStatus {
    type Err = aijob_errors::SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "scheduled" => Ok(TaskStatus::Scheduled),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(aijob_errors::SchedulerError::validation_error(format!(
                "未知的任务状态: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务优先级，数值越大越优先
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl TaskPriority {
    pub fn as_i32(&self) -> i32 {
        match self {
            TaskPriority::Low => 1,
            TaskPriority::Normal => 2,
            TaskPriority::High => 3,
            TaskPriority::Critical => 4,
        }
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(TaskPriority::Low),
            2 => Some(TaskPriority::Normal),
            3 => Some(TaskPriority::High),
            4 => Some(TaskPriority::Critical),
            _ => None,
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Normal
    }
}

/// AI推理任务
///
/// 输入/输出为不透明的字节负载，`model_name` 是Worker必须具备的能力标签，
/// 空字符串表示任意Worker均可执行。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub model_name: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub input: Vec<u8>,
    pub output: Vec<u8>,
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

impl Task {
    pub fn new(
        name: impl Into<String>,
        model_name: impl Into<String>,
        user_id: impl Into<String>,
        priority: TaskPriority,
        input: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            model_name: model_name.into(),
            status: TaskStatus::Pending,
            priority,
            input,
            output: Vec::new(),
            error: String::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            worker_id: None,
            user_id: user_id.into(),
            timeout_seconds: DEFAULT_TASK_TIMEOUT_SECONDS,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 调度/运行中的任务占用Worker
    pub fn is_dispatched(&self) -> bool {
        matches!(self.status, TaskStatus::Scheduled | TaskStatus::Running)
    }

    /// 客户端只允许取消尚未开始执行的任务
    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Scheduled)
    }

    /// 重试预算是否还有剩余
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn entity_description(&self) -> String {
        format!("任务 {} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new("推理测试", "llama-7b", "user-1", TaskPriority::High, vec![1, 2]);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.timeout_seconds, DEFAULT_TASK_TIMEOUT_SECONDS);
        assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(task.retry_count, 0);
        assert!(task.worker_id.is_none());
        assert!(task.started_at.is_none());
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_status_terminal() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Scheduled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in TaskStatus::ALL {
            assert_eq!(TaskStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(TaskStatus::from_str("unknown").is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(TaskPriority::Critical > TaskPriority::High);
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
        assert_eq!(TaskPriority::from_i32(4), Some(TaskPriority::Critical));
        assert_eq!(TaskPriority::from_i32(0), None);
        assert_eq!(TaskPriority::Critical.as_i32(), 4);
    }

    #[test]
    fn test_cancellable() {
        let mut task = Task::new("t", "", "u", TaskPriority::Normal, vec![]);
        assert!(task.is_cancellable());
        task.status = TaskStatus::Scheduled;
        assert!(task.is_cancellable());
        task.status = TaskStatus::Running;
        assert!(!task.is_cancellable());
        task.status = TaskStatus::Completed;
        assert!(!task.is_cancellable());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&TaskStatus::Scheduled).unwrap();
        assert_eq!(json, "\"scheduled\"");
        let status: TaskStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(status, TaskStatus::Cancelled);
    }
}
