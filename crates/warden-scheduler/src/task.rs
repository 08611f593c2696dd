use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::error::SchedulerError;

/// Work the scheduler runs once per interval.
pub trait CycleHandler: Send + Sync {
    fn run_cycle(&self) -> Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + '_>>;

    /// Attempt the cycle again after a transient failure in the same tick.
    ///
    /// Handlers whose cycle has side effects that already completed override
    /// this to repeat only the part that failed.
    fn retry_cycle(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(), SchedulerError>> + Send + '_>> {
        self.run_cycle()
    }

    fn name(&self) -> &str {
        "cycle"
    }
}

/// How often a transiently failing cycle is re-attempted within one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per tick, including the first.
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |d| d.min(self.cap))
    }
}
