pub mod assignment;
pub mod controller;
pub mod liveness;
pub mod resource_ledger;
pub mod timeout;

pub use assignment::{AssignmentConfig, AssignmentEngine};
pub use controller::{SchedulerController, SchedulerLoopConfig};
pub use liveness::LivenessMonitor;
pub use resource_ledger::{ResourceLedger, TaskResources};
pub use timeout::TimeoutSweeper;
