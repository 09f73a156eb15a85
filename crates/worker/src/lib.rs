pub mod api_client;
pub mod executors;
pub mod service;

pub use api_client::{ApiClient, AssignedTask};
pub use executors::{HttpInferenceExecutor, TaskExecutor};
pub use service::WorkerAgent;
