use std::path::PathBuf;

use thiserror::Error;

/// Rejected configuration, either invalid on its face or attempted while
/// a session is running.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sampling period must be strictly positive")]
    InvalidPeriod,

    #[error("output path cannot be empty")]
    EmptyOutputPath,

    #[error("log size cap of {0} bytes is too small to hold a single record")]
    InvalidCapSize(u64),

    #[error("configuration cannot change while a session is running")]
    Running,
}

/// Failure to bring a session up.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("a profiling session is already running")]
    AlreadyRunning,

    #[error("configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open event log '{path}': {reason}")]
    Sink { path: PathBuf, reason: String },

    #[error("failed to launch sampler thread: {0}")]
    Scheduler(String),
}

/// Failure to bring a session down.
#[derive(Debug, Error)]
pub enum StopError {
    #[error("no profiling session is running")]
    NotRunning,
}

/// Misuse of the interval-marking API. Surfaced synchronously to the
/// calling thread, never across the sampler boundary.
#[derive(Debug, Error)]
pub enum IntervalError {
    #[error("time_end(\"{name}\") has no matching open time_begin on this thread")]
    UnmatchedEnd { name: String },

    #[error("interval names cannot be empty")]
    EmptyName,
}
