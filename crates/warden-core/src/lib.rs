//! Exposure audit engine: snapshot fetching, inheritance-aware exposure
//! resolution, idempotent remediation and the default-sharing probe.

pub mod backoff;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod monitor;
pub mod probe;
pub mod remediation;
pub mod report;
pub mod resolver;
pub mod tree;
pub mod vault;

pub use error::{CycleError, FetchError, InvalidTreeError, ProbeError};
pub use monitor::{CycleReport, Monitor, RunMode, ScanReport};
pub use resolver::{Exposure, ExposureReport, ExposureVerdict, resolve};
pub use tree::Snapshot;
