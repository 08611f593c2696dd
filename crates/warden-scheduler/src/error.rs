use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Worth retrying after a delay.
    #[error("transient cycle failure: {0}")]
    Transient(String),
    /// The process cannot continue.
    #[error("fatal cycle failure: {0}")]
    Fatal(String),
    /// The cycle hit bad data; the next cycle still runs.
    #[error("cycle defect: {0}")]
    Defect(String),
}

impl SchedulerError {
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}
