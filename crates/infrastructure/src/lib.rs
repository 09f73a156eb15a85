pub mod database;
pub mod observability;

pub use database::memory::{MemoryTaskRepository, MemoryWorkerRepository};
pub use database::postgres::{PostgresTaskRepository, PostgresWorkerRepository};
pub use observability::metrics::PrometheusMetricsSink;
pub use observability::telemetry;
