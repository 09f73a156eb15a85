use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use aijob_errors::{SchedulerError, SchedulerResult};

/// 上游MCP服务的HTTP客户端
///
/// 入口层只做透传，不理解上下文语义；所有失败统一映射为
/// `McpService` 错误（对客户端是502）。
pub struct McpClient {
    base_url: String,
    http: reqwest::Client,
}

impl McpClient {
    pub fn new(server_url: impl Into<String>, timeout: Duration) -> SchedulerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SchedulerError::McpService(format!("创建MCP客户端失败: {e}")))?;

        Ok(Self {
            base_url: server_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn create_context(&self, body: &Value) -> SchedulerResult<Value> {
        self.post_json("/contexts", body).await
    }

    pub async fn delete_context(&self, context_id: &str) -> SchedulerResult<Value> {
        let url = format!("{}/contexts/{}", self.base_url, context_id);
        debug!("MCP请求: DELETE {}", url);

        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| SchedulerError::McpService(format!("MCP请求失败: {e}")))?;

        Self::read_json(response).await
    }

    pub async fn add_prompt(&self, context_id: &str, body: &Value) -> SchedulerResult<Value> {
        self.post_json(&format!("/contexts/{context_id}/prompt"), body)
            .await
    }

    /// 流式提示：返回上游响应，由入口把SSE字节原样转发给客户端
    pub async fn stream_prompt(
        &self,
        context_id: &str,
        body: &Value,
    ) -> SchedulerResult<reqwest::Response> {
        let url = format!("{}/contexts/{}/prompt", self.base_url, context_id);
        debug!("MCP流式请求: POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await
            .map_err(|e| SchedulerError::McpService(format!("MCP流式请求失败: {e}")))?;

        if !response.status().is_success() {
            return Err(SchedulerError::McpService(format!(
                "MCP服务返回错误状态: {}",
                response.status()
            )));
        }

        Ok(response)
    }

    async fn post_json(&self, path: &str, body: &Value) -> SchedulerResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("MCP请求: POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SchedulerError::McpService(format!("MCP请求失败: {e}")))?;

        Self::read_json(response).await
    }

    async fn read_json(response: reqwest::Response) -> SchedulerResult<Value> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SchedulerError::McpService(format!("读取MCP响应失败: {e}")))?;

        if !status.is_success() {
            return Err(SchedulerError::McpService(format!(
                "MCP服务返回错误状态 {status}: {body}"
            )));
        }

        serde_json::from_str(&body)
            .map_err(|e| SchedulerError::McpService(format!("解析MCP响应失败: {e}")))
    }
}
