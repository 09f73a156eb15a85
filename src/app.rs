use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

use aijob_api::{create_app, AppState, McpClient};
use aijob_config::AppConfig;
use aijob_dispatcher::{
    AssignmentConfig, AssignmentEngine, LivenessMonitor, ResourceLedger, SchedulerController,
    SchedulerLoopConfig, TimeoutSweeper,
};
use aijob_domain::metrics::{MetricsSink, NoopMetricsSink};
use aijob_domain::repositories::{TaskRepository, WorkerRepository};
use aijob_infrastructure::{
    database, telemetry, PostgresTaskRepository, PostgresWorkerRepository, PrometheusMetricsSink,
};
use aijob_worker::{HttpInferenceExecutor, WorkerAgent};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度循环
    Dispatcher,
    /// 仅运行API服务器
    Api,
    /// 仅运行Worker代理
    Worker,
    /// 调度循环 + API（同进程共享账本），可选Worker
    All,
}

/// 调度与入口共享的核心服务
#[derive(Clone)]
struct CoreServices {
    task_repo: Arc<dyn TaskRepository>,
    worker_repo: Arc<dyn WorkerRepository>,
    ledger: Arc<ResourceLedger>,
    metrics: Arc<dyn MetricsSink>,
}

pub struct Application {
    config: AppConfig,
    mode: AppMode,
}

impl Application {
    pub fn new(config: AppConfig, mode: AppMode) -> Self {
        Self { config, mode }
    }

    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        if self.config.observability.metrics_enabled && self.mode != AppMode::Worker {
            telemetry::init_metrics(&self.config.observability.metrics_bind_address)?;
        }

        match self.mode {
            AppMode::Dispatcher => {
                let core = self.init_core().await?;
                self.run_dispatcher(core, shutdown_rx).await
            }
            AppMode::Api => {
                let core = self.init_core().await?;
                self.run_api(core, shutdown_rx).await
            }
            AppMode::Worker => self.run_worker(shutdown_rx).await,
            AppMode::All => self.run_all(shutdown_rx).await,
        }
    }

    /// 连接存储、重建账本、装配指标
    async fn init_core(&self) -> Result<CoreServices> {
        let pool = database::create_pool(&self.config.database).await?;

        let task_repo: Arc<dyn TaskRepository> =
            Arc::new(PostgresTaskRepository::new(pool.clone()));
        let worker_repo: Arc<dyn WorkerRepository> =
            Arc::new(PostgresWorkerRepository::new(pool));

        let ledger = Arc::new(ResourceLedger::new());
        let rebuilt = ledger
            .rebuild(&task_repo, &worker_repo)
            .await
            .context("重建资源账本失败")?;
        info!("资源账本重建完成，恢复 {} 条承诺", rebuilt);

        let metrics: Arc<dyn MetricsSink> = if self.config.observability.metrics_enabled {
            Arc::new(PrometheusMetricsSink::new())
        } else {
            Arc::new(NoopMetricsSink)
        };

        Ok(CoreServices {
            task_repo,
            worker_repo,
            ledger,
            metrics,
        })
    }

    async fn run_dispatcher(
        &self,
        core: CoreServices,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("启动调度服务");

        let scheduler = &self.config.scheduler;
        let assignment = AssignmentEngine::new(
            core.task_repo.clone(),
            core.worker_repo.clone(),
            core.ledger.clone(),
            core.metrics.clone(),
            AssignmentConfig {
                max_tasks: scheduler.max_tasks,
                heartbeat_freshness: chrono::Duration::seconds(
                    scheduler.heartbeat_freshness_seconds,
                ),
            },
        );
        let liveness = LivenessMonitor::new(
            core.task_repo.clone(),
            core.worker_repo.clone(),
            core.ledger.clone(),
            core.metrics.clone(),
            chrono::Duration::seconds(scheduler.heartbeat_interval_seconds as i64),
        );
        let sweeper = TimeoutSweeper::new(
            core.task_repo.clone(),
            core.worker_repo.clone(),
            core.ledger.clone(),
            core.metrics.clone(),
            scheduler.task_timeout_seconds,
        );

        let controller = SchedulerController::new(
            assignment,
            liveness,
            sweeper,
            SchedulerLoopConfig {
                poll_interval: Duration::from_secs(scheduler.poll_interval_seconds),
                heartbeat_interval: Duration::from_secs(scheduler.heartbeat_interval_seconds),
            },
        );

        controller.run(shutdown_rx).await;
        info!("调度服务已停止");
        Ok(())
    }

    async fn run_api(
        &self,
        core: CoreServices,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!("启动API服务器: {}", self.config.api.bind_address);

        let mcp = if self.config.mcp.enabled {
            Some(Arc::new(McpClient::new(
                self.config.mcp.server_url.clone(),
                Duration::from_secs(self.config.mcp.timeout_seconds),
            )?))
        } else {
            None
        };

        let state = AppState {
            task_repo: core.task_repo,
            worker_repo: core.worker_repo,
            ledger: core.ledger,
            metrics: core.metrics,
            mcp,
            heartbeat_freshness: chrono::Duration::seconds(
                self.config.scheduler.heartbeat_freshness_seconds,
            ),
        };
        let app = create_app(state, self.config.api.cors_enabled);

        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("API服务器运行失败: {}", e);
            }
        });

        let _ = shutdown_rx.recv().await;
        info!("API服务器收到关闭信号");
        server_handle.abort();

        info!("API服务器已停止");
        Ok(())
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let worker = &self.config.worker;
        info!("启动Worker代理: {}", worker.name);

        let endpoint = worker
            .model_endpoint
            .as_ref()
            .context("Worker模式需要配置 worker.model_endpoint")?;
        let executor = Arc::new(HttpInferenceExecutor::new(endpoint.clone()));

        let agent = WorkerAgent::new(worker.clone(), executor);
        agent.run(shutdown_rx).await?;

        info!("Worker代理已停止");
        Ok(())
    }

    async fn run_all(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");

        // 调度循环与入口共享同一份账本与存储连接
        let core = self.init_core().await?;
        let mut handles = Vec::new();

        if self.config.scheduler.enabled {
            let app = Application::new(self.config.clone(), AppMode::Dispatcher);
            let core = core.clone();
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_dispatcher(core, rx).await {
                    error!("调度服务运行失败: {}", e);
                }
            }));
        }

        if self.config.api.enabled {
            let app = Application::new(self.config.clone(), AppMode::Api);
            let core = core.clone();
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_api(core, rx).await {
                    error!("API服务器运行失败: {}", e);
                }
            }));
        }

        if self.config.worker.enabled {
            let app = Application::new(self.config.clone(), AppMode::Worker);
            let rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_worker(rx).await {
                    error!("Worker代理运行失败: {}", e);
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("所有组件已停止");
        Ok(())
    }
}
