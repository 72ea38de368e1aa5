//! procpulse — an embeddable sampling profiler.
//!
//! Link this crate into a process to periodically record its CPU,
//! memory, and (optionally) GPU usage, plus explicitly marked named
//! intervals, into an append-only JSON-lines log. One background thread
//! drives the sampling; marker calls run synchronously on the caller's
//! thread and are bounded-fast, so profiling stays cheap enough to
//! leave on in production-like runs.
//!
//! The engine never panics or blocks the host: collectors that cannot
//! read their counters are disabled for the session, and sink write
//! failures put the log into a counted record-loss mode instead of
//! taking anything down.
//!
//! ```no_run
//! use std::time::Duration;
//! use procpulse::{Profiler, ProfilerConfig};
//!
//! let profiler = Profiler::new();
//! profiler.configure(
//!     ProfilerConfig::new("run.log")
//!         .period(Duration::from_millis(200))
//!         .enable_gpu(true),
//! )?;
//! profiler.start()?;
//!
//! profiler.time_begin("load_assets");
//! // ... workload ...
//! profiler.time_end("load_assets")?;
//!
//! let summary = profiler.stop()?;
//! println!("{} cpu samples", summary.sample_count(procpulse::MetricKind::Cpu));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod collectors;
pub mod error;
pub mod event;
mod intervals;
mod profiler;
mod sampler;
mod stats;
mod writer;

pub use collectors::{
    instant_cpu_usage, process_memory, system_memory, GpuMonitor, NvidiaSmiMonitor,
};
pub use error::{ConfigError, IntervalError, StartError, StopError};
pub use event::{
    GpuReading, Interval, LogEvent, Marker, MetricKind, MetricValues, ProcessMemory, Sample,
    SessionMeta, SystemMemory, Timestamps,
};
pub use profiler::{EngineHealth, Profiler, ProfilerConfig};
pub use stats::{IntervalSummary, PercentileSet, SessionSummary};
