use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::error::SchedulerError;
use crate::task::{CycleHandler, RetryPolicy};

/// Runs one cycle per interval until shutdown or a fatal failure.
///
/// Cycles never overlap: a tick that fires while a cycle is still running is
/// delayed rather than queued.
pub struct Scheduler {
    interval: Duration,
    handler: Box<dyn CycleHandler>,
    retry: RetryPolicy,
    shutdown_rx: watch::Receiver<bool>,
    cycles: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(
        interval: Duration,
        handler: Box<dyn CycleHandler>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            interval,
            handler,
            retry: RetryPolicy::default(),
            shutdown_rx,
            cycles: 0,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cycles started so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Run the scheduler loop.
    ///
    /// A shutdown signal stops the loop between cycles; a running cycle is
    /// never interrupted.
    ///
    /// # Errors
    ///
    /// Returns the first [`SchedulerError::Fatal`] reported by the handler.
    pub async fn run(&mut self) -> Result<(), SchedulerError> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        tracing::info!("scheduler shutting down");
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }

            match self.tick().await {
                Ok(()) => {}
                Err(e @ SchedulerError::Fatal(_)) => {
                    tracing::error!(handler = self.handler.name(), "stopping scheduler: {e}");
                    return Err(e);
                }
                Err(e @ SchedulerError::Defect(_)) => {
                    tracing::error!(handler = self.handler.name(), "{e}");
                }
                Err(e @ SchedulerError::Transient(_)) => {
                    tracing::warn!(
                        handler = self.handler.name(),
                        "{e}; retrying next interval"
                    );
                }
            }
        }
        Ok(())
    }

    /// Run a single cycle with transient retries and return its result.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn run_once(&mut self) -> Result<(), SchedulerError> {
        self.tick().await
    }

    async fn tick(&mut self) -> Result<(), SchedulerError> {
        self.cycles += 1;
        let cycle = self.cycles;
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            tracing::debug!(handler = self.handler.name(), cycle, attempt, "cycle started");
            let result = if attempt == 1 {
                self.handler.run_cycle().await
            } else {
                self.handler.retry_cycle().await
            };
            match result {
                Ok(()) => return Ok(()),
                Err(SchedulerError::Transient(msg)) if attempt < max_attempts => {
                    let delay = self.retry.delay(attempt);
                    tracing::warn!(
                        handler = self.handler.name(),
                        cycle,
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient cycle failure: {msg}"
                    );
                    if self.sleep_or_shutdown(delay).await {
                        tracing::info!(cycle, "shutdown during retry backoff");
                        return Ok(());
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep for `delay`. Returns `true` if shutdown was requested meanwhile.
    async fn sleep_or_shutdown(&mut self, delay: Duration) -> bool {
        if *self.shutdown_rx.borrow() {
            return true;
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => false,
            changed = self.shutdown_rx.changed() => {
                changed.is_err() || *self.shutdown_rx.borrow()
            }
        }
    }
}
