use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use crate::event::MetricKind;

/// Histogram resolution: 3 significant figures, auto-resizing range.
const HIST_SIGFIG: u8 = 3;

// ─── Percentiles ─────────────────────────────────────────────────

/// A complete percentile breakdown for one interval name (microseconds).
#[derive(Debug, Clone, Serialize)]
pub struct PercentileSet {
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub count: u64,
}

impl PercentileSet {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }
        Self {
            min: hist.min(),
            max: hist.max(),
            mean: hist.mean(),
            p50: hist.value_at_percentile(50.0),
            p95: hist.value_at_percentile(95.0),
            p99: hist.value_at_percentile(99.0),
            count: hist.len(),
        }
    }

    /// All-zero placeholder used before any observations are recorded.
    pub fn empty() -> Self {
        Self {
            min: 0,
            max: 0,
            mean: 0.0,
            p50: 0,
            p95: 0,
            p99: 0,
            count: 0,
        }
    }
}

// ─── Session accounting ──────────────────────────────────────────

/// Live counters for one session: per-kind sample counts and one duration
/// histogram per interval name. Sampler and marker threads both record
/// into it; `summary()` reads a consistent snapshot under the same lock.
pub(crate) struct SessionStats {
    inner: Mutex<Inner>,
    collector_failures: AtomicU64,
}

struct Inner {
    samples: HashMap<MetricKind, u64>,
    intervals: HashMap<String, Histogram<u64>>,
    started: Instant,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                samples: HashMap::new(),
                intervals: HashMap::new(),
                started: Instant::now(),
            }),
            collector_failures: AtomicU64::new(0),
        }
    }

    pub fn count_sample(&self, kind: MetricKind) {
        *self.inner.lock().samples.entry(kind).or_insert(0) += 1;
    }

    pub fn record_interval(&self, name: &str, duration_us: u64) {
        let mut inner = self.inner.lock();
        let hist = inner
            .intervals
            .entry(name.to_owned())
            .or_insert_with(|| Histogram::new(HIST_SIGFIG).expect("histogram creation"));
        let _ = hist.record(duration_us.max(1));
    }

    pub fn collector_failure(&self) {
        self.collector_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn collector_failures(&self) -> u64 {
        self.collector_failures.load(Ordering::Relaxed)
    }

    pub fn summary(&self, write_errors: u64, dropped_records: u64) -> SessionSummary {
        let inner = self.inner.lock();

        let mut intervals: Vec<IntervalSummary> = inner
            .intervals
            .iter()
            .map(|(name, hist)| IntervalSummary {
                name: name.clone(),
                durations_us: PercentileSet::from_histogram(hist),
            })
            .collect();
        intervals.sort_by(|a, b| a.name.cmp(&b.name));

        SessionSummary {
            elapsed_secs: inner.started.elapsed().as_secs_f64(),
            samples: inner.samples.clone(),
            intervals,
            write_errors,
            dropped_records,
            collector_failures: self.collector_failures(),
        }
    }
}

// ─── Summary types ───────────────────────────────────────────────

/// Duration percentiles for one interval name.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalSummary {
    pub name: String,
    pub durations_us: PercentileSet,
}

/// Everything `stop()` can tell you about the finished session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub elapsed_secs: f64,
    /// Number of samples recorded per metric kind.
    pub samples: HashMap<MetricKind, u64>,
    /// Per-name interval statistics, sorted by name.
    pub intervals: Vec<IntervalSummary>,
    pub write_errors: u64,
    pub dropped_records: u64,
    pub collector_failures: u64,
}

impl SessionSummary {
    pub fn sample_count(&self, kind: MetricKind) -> u64 {
        self.samples.get(&kind).copied().unwrap_or(0)
    }

    pub fn interval(&self, name: &str) -> Option<&IntervalSummary> {
        self.intervals.iter().find(|i| i.name == name)
    }
}
