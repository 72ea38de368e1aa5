use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ─── Clocks ──────────────────────────────────────────────────────

/// Both clocks attached to every record: wall-clock epoch milliseconds
/// for correlating with the outside world, monotonic microseconds since
/// session start for computing durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Wall-clock time, milliseconds since the Unix epoch.
    pub ts_ms: i64,
    /// Monotonic time, microseconds since the session started.
    pub mono_us: u64,
}

/// Per-session monotonic anchor. Cheap to copy into the sampler thread
/// and every marker call site.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    epoch: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamps {
        Timestamps {
            ts_ms: Utc::now().timestamp_millis(),
            mono_us: self.epoch.elapsed().as_micros() as u64,
        }
    }
}

// ─── Metric kinds and values ─────────────────────────────────────

/// Closed set of metric kinds the engine knows how to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Process CPU usage as a percentage of wall time.
    Cpu,
    /// Per-core system CPU load percentages.
    CpuCores,
    /// Process memory (resident / shared / virtual).
    ProcMem,
    /// System-wide memory (total / available / free).
    SysMem,
    /// GPU utilization and memory.
    Gpu,
}

/// Process memory counters, kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMemory {
    pub rss_kb: u64,
    pub shared_kb: u64,
    pub vm_kb: u64,
}

/// System-wide memory counters, kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemMemory {
    pub total_kb: u64,
    pub available_kb: u64,
    pub free_kb: u64,
}

/// One reading from a GPU monitor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpuReading {
    pub usage_pct: f32,
    pub mem_used_kb: u64,
    pub mem_total_kb: u64,
}

/// The measured values of one sample, tagged by metric kind. A closed
/// enum rather than stringly-typed payloads so a new kind cannot reach
/// the writer without a variant here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricValues {
    Cpu { percent: f64 },
    CpuCores { per_core: Vec<f32> },
    ProcMem(ProcessMemory),
    SysMem(SystemMemory),
    Gpu(GpuReading),
}

impl MetricValues {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Cpu { .. } => MetricKind::Cpu,
            Self::CpuCores { .. } => MetricKind::CpuCores,
            Self::ProcMem(_) => MetricKind::ProcMem,
            Self::SysMem(_) => MetricKind::SysMem,
            Self::Gpu(_) => MetricKind::Gpu,
        }
    }
}

// ─── Records ─────────────────────────────────────────────────────

/// One timestamped measurement of a single metric kind. Immutable once
/// created: produced by a collector, consumed once by the writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    #[serde(flatten)]
    pub at: Timestamps,
    #[serde(flatten)]
    pub values: MetricValues,
}

/// A completed named span. `at` is taken when the interval ends;
/// `duration_us` is exactly `at.mono_us - start_mono_us`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interval {
    #[serde(flatten)]
    pub at: Timestamps,
    pub name: String,
    /// Numeric tag of the thread that ran the begin/end pair.
    pub thread: u64,
    pub start_mono_us: u64,
    pub duration_us: u64,
}

/// An instant named event with no duration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    #[serde(flatten)]
    pub at: Timestamps,
    pub name: String,
    pub thread: u64,
}

/// Session header written as the first record, so a log file is
/// self-describing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(flatten)]
    pub at: Timestamps,
    pub session: String,
    pub pid: u32,
    pub period_ms: u64,
    pub version: String,
}

/// The union of everything that can appear in the log. Exists only at
/// the writer boundary — one record per line, discriminated by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEvent {
    Meta(SessionMeta),
    Sample(Sample),
    Interval(Interval),
    Marker(Marker),
}
