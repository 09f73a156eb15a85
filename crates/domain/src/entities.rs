pub use crate::models::task::{Task, TaskPriority, TaskStatus};
pub use crate::models::worker::{WorkerInfo, WorkerStatus};
