use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Available,
    Busy,
    Offline,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Available => "available",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Offline => "offline",
        }
    }

    pub const ALL: [WorkerStatus; 3] = [
        WorkerStatus::Available,
        WorkerStatus::Busy,
        WorkerStatus::Offline,
    ];
}

impl std::str::FromStr for WorkerStatus {
    type Err = aijob_errors::SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(WorkerStatus::Available),
            "busy" => Ok(WorkerStatus::Busy),
            "offline" => Ok(WorkerStatus::Offline),
            other => Err(aijob_errors::SchedulerError::validation_error(format!(
                "未知的Worker状态: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker节点信息
///
/// `available_*` 字段是节点注册时声明的资源容量，不是实时余额；
/// 内存统一使用字节为单位。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub name: String,
    pub status: WorkerStatus,
    pub capabilities: Vec<String>,
    pub current_task_id: Option<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub available_cpu: f64,
    pub available_memory: i64,
    pub available_gpu: f64,
    pub total_tasks_handled: i64,
}

impl WorkerInfo {
    pub fn new(name: impl Into<String>, capabilities: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            status: WorkerStatus::Available,
            capabilities,
            current_task_id: None,
            last_heartbeat: now,
            registered_at: now,
            available_cpu: 0.0,
            available_memory: 0,
            available_gpu: 0.0,
            total_tasks_handled: 0,
        }
    }

    /// 空模型标签匹配任意Worker
    pub fn supports_model(&self, model_name: &str) -> bool {
        model_name.is_empty() || self.capabilities.iter().any(|c| c == model_name)
    }

    /// 空闲且未持有任务
    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Available && self.current_task_id.is_none()
    }

    pub fn entity_description(&self) -> String {
        format!("Worker {} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_worker_new() {
        let worker = WorkerInfo::new("gpu-node-1", vec!["llama-7b".to_string()]);
        assert_eq!(worker.status, WorkerStatus::Available);
        assert!(worker.current_task_id.is_none());
        assert_eq!(worker.total_tasks_handled, 0);
        assert!(!worker.id.is_empty());
    }

    #[test]
    fn test_supports_model() {
        let worker = WorkerInfo::new(
            "w",
            vec!["llama-7b".to_string(), "qwen-14b".to_string()],
        );
        assert!(worker.supports_model("llama-7b"));
        assert!(worker.supports_model("qwen-14b"));
        assert!(worker.supports_model(""));
        assert!(!worker.supports_model("gpt-oss"));
    }

    #[test]
    fn test_is_idle() {
        let mut worker = WorkerInfo::new("w", vec![]);
        assert!(worker.is_idle());
        worker.current_task_id = Some("t-1".to_string());
        assert!(!worker.is_idle());
        worker.current_task_id = None;
        worker.status = WorkerStatus::Busy;
        assert!(!worker.is_idle());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in WorkerStatus::ALL {
            assert_eq!(WorkerStatus::from_str(status.as_str()).unwrap(), status);
        }
        assert!(WorkerStatus::from_str("dead").is_err());
    }
}
