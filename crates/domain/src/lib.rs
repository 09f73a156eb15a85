pub mod entities;
pub mod metrics;
pub mod models;
pub mod repositories;

pub use entities::*;
pub use metrics::MetricsSink;
pub use repositories::{TaskFilter, TaskRepository, WorkerRepository};
