use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use aijob_config::WorkerAgentConfig;
use aijob_errors::{SchedulerError, SchedulerResult};

use crate::api_client::{ApiClient, AssignedTask};
use crate::executors::TaskExecutor;

/// Worker代理
///
/// 协议侧的Worker：注册拿到身份，按心跳间隔上报存活，按轮询间隔
/// 领取分配给自己的任务，执行后上报终态。报告是幂等的，调度器侧
/// 的超时或回收抢先时，迟到的终态报告会被丢弃。
pub struct WorkerAgent {
    config: WorkerAgentConfig,
    client: ApiClient,
    executor: Arc<dyn TaskExecutor>,
}

impl WorkerAgent {
    pub fn new(config: WorkerAgentConfig, executor: Arc<dyn TaskExecutor>) -> Self {
        let client = ApiClient::new(config.api_url.clone());
        Self {
            config,
            client,
            executor,
        }
    }

    /// 注册并进入主循环，直到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> SchedulerResult<()> {
        let registered = self
            .client
            .register(
                &self.config.name,
                &self.config.capabilities,
                self.config.available_cpu,
                self.config.available_memory,
                self.config.available_gpu,
            )
            .await?;
        info!("Worker {} 注册成功，ID: {}", registered.name, registered.id);
        let worker_id = registered.id;

        let mut heartbeat_tick =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval_seconds));
        let mut poll_tick =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_seconds));
        heartbeat_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat_tick.tick() => {
                    if let Err(e) = self.client.heartbeat(&worker_id).await {
                        warn!("心跳失败，下个周期重试: {}", e);
                    }
                }
                _ = poll_tick.tick() => {
                    match self.client.fetch_assigned_task(&worker_id).await {
                        Ok(Some(task)) => {
                            info!("领取到任务: {} ({})", task.id, task.name);
                            self.execute_and_report(&worker_id, task).await;
                        }
                        Ok(None) => {}
                        Err(e) => warn!("任务轮询失败，下个周期重试: {}", e),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Worker {} 收到关闭信号", worker_id);
                    break;
                }
            }
        }

        Ok(())
    }

    async fn execute_and_report(&self, worker_id: &str, task: AssignedTask) {
        if let Err(e) = self.client.report_running(worker_id, &task.id).await {
            // running报告失败不中止执行；调度器最终会通过超时或回收收敛
            warn!("上报任务 {} running状态失败: {}", task.id, e);
        }

        let result = self.execute(&task).await;
        let report = match &result {
            Ok(output) => {
                self.client
                    .report_completed(worker_id, &task.id, &BASE64.encode(output))
                    .await
            }
            Err(e) => {
                error!("任务 {} 执行失败: {}", task.id, e);
                self.client
                    .report_failed(worker_id, &task.id, &e.to_string())
                    .await
            }
        };

        if let Err(e) = report {
            error!("上报任务 {} 终态失败: {}", task.id, e);
        }
    }

    async fn execute(&self, task: &AssignedTask) -> SchedulerResult<Vec<u8>> {
        let input = BASE64
            .decode(&task.input)
            .map_err(|e| SchedulerError::Serialization(format!("任务输入不是合法的base64: {e}")))?;

        let timeout = Duration::from_secs(task.timeout_seconds.max(1) as u64);
        match tokio::time::timeout(timeout, self.executor.execute(task, &input)).await {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Timeout(format!(
                "任务 {} 本地执行超时（{}秒）",
                task.id, task.timeout_seconds
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::test_executors::EchoExecutor;

    fn agent_config() -> WorkerAgentConfig {
        WorkerAgentConfig {
            enabled: true,
            name: "w-test".to_string(),
            api_url: "http://127.0.0.1:1".to_string(),
            capabilities: vec![],
            available_cpu: 1.0,
            available_memory: 1024,
            available_gpu: 0.0,
            poll_interval_seconds: 1,
            heartbeat_interval_seconds: 1,
            model_endpoint: None,
        }
    }

    fn assigned_task(input_base64: &str, timeout_seconds: i64) -> AssignedTask {
        AssignedTask {
            id: "t-1".to_string(),
            name: "t".to_string(),
            model_name: String::new(),
            input: input_base64.to_string(),
            timeout_seconds,
            worker_id: Some("w-1".to_string()),
        }
    }

    #[tokio::test]
    async fn test_execute_decodes_input() {
        let agent = WorkerAgent::new(agent_config(), Arc::new(EchoExecutor));
        let task = assigned_task(&BASE64.encode(b"payload"), 10);
        let output = agent.execute(&task).await.unwrap();
        assert_eq!(output, b"payload");
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_base64() {
        let agent = WorkerAgent::new(agent_config(), Arc::new(EchoExecutor));
        let task = assigned_task("!!!", 10);
        let err = agent.execute(&task).await.unwrap_err();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_run_fails_fast_when_unreachable() {
        let agent = WorkerAgent::new(agent_config(), Arc::new(EchoExecutor));
        let (_tx, rx) = broadcast::channel(1);
        let err = agent.run(rx).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
