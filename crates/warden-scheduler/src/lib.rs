//! Fixed-interval cycle scheduler with transient retry and graceful shutdown.

mod error;
mod scheduler;
mod task;

pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use task::{CycleHandler, RetryPolicy};
