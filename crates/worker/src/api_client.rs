use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use aijob_errors::{SchedulerError, SchedulerResult};

/// 调度器REST入口返回的统一信封
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredWorker {
    pub id: String,
    pub name: String,
}

/// 调度器下发给本Worker的任务视图，输入为base64编码
#[derive(Debug, Clone, Deserialize)]
pub struct AssignedTask {
    pub id: String,
    pub name: String,
    pub model_name: String,
    pub input: String,
    pub timeout_seconds: i64,
    pub worker_id: Option<String>,
}

/// 调度器入口的HTTP客户端
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn register(
        &self,
        name: &str,
        capabilities: &[String],
        available_cpu: f64,
        available_memory: i64,
        available_gpu: f64,
    ) -> SchedulerResult<RegisteredWorker> {
        let body = json!({
            "name": name,
            "capabilities": capabilities,
            "available_cpu": available_cpu,
            "available_memory": available_memory,
            "available_gpu": available_gpu,
        });

        let response = self
            .http
            .post(format!("{}/api/workers", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("Worker注册请求失败: {e}")))?;

        Self::read_envelope(response).await
    }

    pub async fn heartbeat(&self, worker_id: &str) -> SchedulerResult<()> {
        let response = self
            .http
            .put(format!("{}/api/workers/{worker_id}/heartbeat", self.base_url))
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("心跳请求失败: {e}")))?;

        if response.status().is_success() {
            debug!("Worker {} 心跳成功", worker_id);
            Ok(())
        } else {
            Err(SchedulerError::Network(format!(
                "心跳返回错误状态: {}",
                response.status()
            )))
        }
    }

    /// 轮询scheduled状态的任务，返回分配给本Worker的那一个
    pub async fn fetch_assigned_task(
        &self,
        worker_id: &str,
    ) -> SchedulerResult<Option<AssignedTask>> {
        let response = self
            .http
            .get(format!("{}/api/tasks?status=scheduled", self.base_url))
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("任务轮询请求失败: {e}")))?;

        let tasks: Vec<AssignedTask> = Self::read_envelope(response).await?;
        Ok(tasks
            .into_iter()
            .find(|t| t.worker_id.as_deref() == Some(worker_id)))
    }

    pub async fn report_running(&self, worker_id: &str, task_id: &str) -> SchedulerResult<()> {
        self.report(
            worker_id,
            json!({
                "status": "busy",
                "current_task_id": task_id,
                "task_status": "running",
            }),
        )
        .await
    }

    pub async fn report_completed(
        &self,
        worker_id: &str,
        task_id: &str,
        output_base64: &str,
    ) -> SchedulerResult<()> {
        self.report(
            worker_id,
            json!({
                "status": "available",
                "current_task_id": task_id,
                "task_status": "completed",
                "task_output": output_base64,
            }),
        )
        .await
    }

    pub async fn report_failed(
        &self,
        worker_id: &str,
        task_id: &str,
        error: &str,
    ) -> SchedulerResult<()> {
        self.report(
            worker_id,
            json!({
                "status": "available",
                "current_task_id": task_id,
                "task_status": "failed",
                "task_error": error,
            }),
        )
        .await
    }

    async fn report(&self, worker_id: &str, body: serde_json::Value) -> SchedulerResult<()> {
        let response = self
            .http
            .put(format!("{}/api/workers/{worker_id}/status", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("状态上报请求失败: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SchedulerError::Network(format!(
                "状态上报返回错误状态: {}",
                response.status()
            )))
        }
    }

    async fn read_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> SchedulerResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("调度器返回错误状态 {}: {}", status, body);
            return Err(SchedulerError::Network(format!(
                "调度器返回错误状态 {status}"
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| SchedulerError::Serialization(format!("解析调度器响应失败: {e}")))?;

        if !envelope.success {
            return Err(SchedulerError::Internal(
                envelope.message.unwrap_or_else(|| "调度器返回失败".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| SchedulerError::Serialization("调度器响应缺少data字段".to_string()))
    }
}
