use std::io::{self, BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::event::{GpuReading, MetricKind, MetricValues};

use super::Collector;

// ─── Monitor trait ───────────────────────────────────────────────

/// Vendor-specific GPU probe. Implementations own whatever machinery the
/// vendor needs (SDK handles, helper processes) and expose the latest
/// reading without blocking: `reading()` is called from the sampler loop
/// and must return promptly.
///
/// A monitor that cannot come up at session start is dropped from the
/// collector set — GPU absence is never an engine failure.
pub trait GpuMonitor: Send {
    /// Begin watching at roughly the given cadence. An error means the
    /// device or tooling is unavailable.
    fn start(&mut self, period: Duration) -> io::Result<()>;

    /// Stop watching and release resources. Must be idempotent.
    fn stop(&mut self);

    /// Most recent reading, if any has been produced yet.
    fn reading(&self) -> Option<GpuReading>;
}

// ─── nvidia-smi monitor ──────────────────────────────────────────

/// Default monitor backed by `nvidia-smi` in continuous mode. The tool
/// streams one CSV line per period; a private reader thread parses each
/// line into a cached reading, so the sampler only ever takes a mutex.
pub struct NvidiaSmiMonitor {
    latest: Arc<Mutex<Option<GpuReading>>>,
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
}

impl NvidiaSmiMonitor {
    pub fn new() -> Self {
        Self {
            latest: Arc::new(Mutex::new(None)),
            child: None,
            reader: None,
        }
    }
}

impl Default for NvidiaSmiMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuMonitor for NvidiaSmiMonitor {
    fn start(&mut self, period: Duration) -> io::Result<()> {
        if self.child.is_some() {
            return Ok(());
        }

        let mut child = Command::new("nvidia-smi")
            .arg(format!("-lms={}", period.as_millis().max(1)))
            .arg("--query-gpu=utilization.gpu,memory.used,memory.total")
            .arg("--format=csv,noheader,nounits")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "nvidia-smi stdout not captured")
        })?;

        let latest = Arc::clone(&self.latest);
        let reader = std::thread::Builder::new()
            .name("procpulse-gpu".into())
            .spawn(move || {
                // Exits on EOF, which the kill in stop() forces.
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if let Some(reading) = parse_smi_line(&line) {
                        *latest.lock() = Some(reading);
                    }
                }
            })?;

        self.child = Some(child);
        self.reader = Some(reader);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        *self.latest.lock() = None;
    }

    fn reading(&self) -> Option<GpuReading> {
        *self.latest.lock()
    }
}

impl Drop for NvidiaSmiMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One `nvidia-smi` CSV line: `utilization.gpu, memory.used, memory.total`
/// with `nounits` (percent, MiB, MiB).
fn parse_smi_line(line: &str) -> Option<GpuReading> {
    let mut fields = line.split(',').map(str::trim);
    let usage_pct: f32 = fields.next()?.parse().ok()?;
    let mem_used_mib: u64 = fields.next()?.parse().ok()?;
    let mem_total_mib: u64 = fields.next()?.parse().ok()?;
    Some(GpuReading {
        usage_pct,
        mem_used_kb: mem_used_mib * 1024,
        mem_total_kb: mem_total_mib * 1024,
    })
}

// ─── Collector adapter ───────────────────────────────────────────

/// Bridges a running monitor into the collector set. The monitor itself
/// is owned by the session (it must be stopped at teardown); the
/// collector just snapshots the cached reading each period.
pub(crate) struct GpuCollector {
    monitor: Arc<Mutex<Box<dyn GpuMonitor>>>,
}

impl GpuCollector {
    pub fn new(monitor: Arc<Mutex<Box<dyn GpuMonitor>>>) -> Self {
        Self { monitor }
    }
}

impl Collector for GpuCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Gpu
    }

    fn collect(&mut self) -> Option<MetricValues> {
        self.monitor.lock().reading().map(MetricValues::Gpu)
    }
}
