use std::time::Duration;

use async_trait::async_trait;

use aijob_errors::{SchedulerError, SchedulerResult};

use crate::api_client::AssignedTask;

/// 任务执行接口
///
/// 模型推理本身不在Worker代理内实现；执行器把不透明的输入负载
/// 交给外部推理服务并取回输出。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &AssignedTask, input: &[u8]) -> SchedulerResult<Vec<u8>>;
}

/// 把输入负载POST到推理服务、以响应体作为输出的执行器
pub struct HttpInferenceExecutor {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpInferenceExecutor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TaskExecutor for HttpInferenceExecutor {
    async fn execute(&self, task: &AssignedTask, input: &[u8]) -> SchedulerResult<Vec<u8>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Model-Name", &task.model_name)
            .timeout(Duration::from_secs(task.timeout_seconds.max(1) as u64))
            .body(input.to_vec())
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("推理服务请求失败: {e}")))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SchedulerError::Network(format!("读取推理服务响应失败: {e}")))?;

        if !status.is_success() {
            return Err(SchedulerError::Internal(format!(
                "推理服务返回错误状态 {status}: {}",
                String::from_utf8_lossy(&body)
            )));
        }

        Ok(body.to_vec())
    }
}
