pub mod models;
pub mod validation;

pub use models::{
    ApiConfig, AppConfig, DatabaseConfig, McpConfig, ObservabilityConfig, SchedulerConfig,
    WorkerAgentConfig,
};
pub use validation::ConfigValidator;
