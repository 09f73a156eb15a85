use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use chrono::Duration;

use aijob_dispatcher::ResourceLedger;
use aijob_domain::metrics::MetricsSink;
use aijob_domain::repositories::{TaskRepository, WorkerRepository};

use crate::handlers::{
    health::health_check,
    mcp::{create_context, delete_context, get_mcp_task, list_mcp_tasks, prompt},
    system::get_system_stats,
    tasks::{cancel_task, create_task, get_task, list_tasks},
    workers::{get_worker, list_workers, register_worker, update_worker_status, worker_heartbeat},
};
use crate::mcp_client::McpClient;
use crate::middleware::{cors_layer, trace_layer};

#[derive(Clone)]
pub struct AppState {
    pub task_repo: Arc<dyn TaskRepository>,
    pub worker_repo: Arc<dyn WorkerRepository>,
    pub ledger: Arc<ResourceLedger>,
    pub metrics: Arc<dyn MetricsSink>,
    pub mcp: Option<Arc<McpClient>>,
    /// list_available 的心跳新鲜度窗口
    pub heartbeat_freshness: Duration,
}

pub fn create_routes(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", get(get_task).delete(cancel_task))
        .route("/api/workers", get(list_workers).post(register_worker))
        .route("/api/workers/{id}", get(get_worker))
        .route("/api/workers/{id}/heartbeat", put(worker_heartbeat))
        .route("/api/workers/{id}/status", put(update_worker_status))
        .route("/api/system/stats", get(get_system_stats));

    if state.mcp.is_some() {
        router = router
            .route("/api/mcp/contexts", post(create_context))
            .route(
                "/api/mcp/contexts/{id}",
                axum::routing::delete(delete_context),
            )
            .route("/api/mcp/contexts/{id}/prompt", post(prompt))
            .route("/api/mcp/tasks", get(list_mcp_tasks))
            .route("/api/mcp/tasks/{id}", get(get_mcp_task));
    }

    router.with_state(state)
}

pub fn create_app(state: AppState, cors_enabled: bool) -> Router {
    let router = create_routes(state).layer(trace_layer());
    if cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
