pub mod builders;
pub mod mocks;

pub use builders::{TaskBuilder, WorkerBuilder};
pub use mocks::{FailingTaskRepository, FailingWorkerRepository, RecordingMetricsSink};
