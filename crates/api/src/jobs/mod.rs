//! Background jobs.

pub mod message_dispatch;
pub mod pool_metrics;
pub mod scheduler;
pub mod workflow_schedule;

pub use message_dispatch::MessageDispatchJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobScheduler};
pub use workflow_schedule::{SchedulePassReport, WorkflowScheduleJob};
