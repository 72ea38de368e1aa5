use std::fs;
use std::time::Instant;

use crate::event::{MetricKind, MetricValues};

use super::Collector;

// ─── Process CPU ─────────────────────────────────────────────────

/// Process CPU usage as a percentage of wall time: the delta of
/// (utime + stime) from `/proc/self/stat` between consecutive collects,
/// divided by the wall-clock delta. Can exceed 100 on multi-core load.
pub(crate) struct CpuCollector {
    ticks_per_sec: f64,
    last: Option<(u64, Instant)>,
}

impl CpuCollector {
    pub fn new() -> Self {
        let hz = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
        Self {
            ticks_per_sec: if hz > 0 { hz as f64 } else { 100.0 },
            // Anchor the baseline at session start so the first sample
            // covers exactly the first period.
            last: read_self_ticks().map(|ticks| (ticks, Instant::now())),
        }
    }
}

impl Collector for CpuCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::Cpu
    }

    fn collect(&mut self) -> Option<MetricValues> {
        let ticks = read_self_ticks()?;
        let now = Instant::now();

        let percent = match self.last {
            Some((prev_ticks, prev_at)) => {
                let wall_secs = now.duration_since(prev_at).as_secs_f64();
                if wall_secs > 0.0 {
                    let cpu_secs = ticks.saturating_sub(prev_ticks) as f64 / self.ticks_per_sec;
                    (cpu_secs / wall_secs) * 100.0
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.last = Some((ticks, now));

        Some(MetricValues::Cpu {
            percent: percent.max(0.0),
        })
    }
}

fn read_self_ticks() -> Option<u64> {
    parse_self_stat(&fs::read_to_string("/proc/self/stat").ok()?)
}

/// Pull utime + stime (clock ticks) out of a `/proc/[pid]/stat` line.
/// The comm field may contain spaces and parentheses, so fields are
/// counted from the last ')'.
fn parse_self_stat(content: &str) -> Option<u64> {
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // After comm: state ppid pgrp ... utime is field 12, stime field 13.
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(utime + stime)
}

// ─── Per-core system CPU ─────────────────────────────────────────

/// Per-core load percentages from `/proc/stat`: for each core, the share
/// of non-idle time in the delta since the previous read.
pub(crate) struct CpuCoresCollector {
    last: Vec<CoreTimes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CoreTimes {
    idle: u64,
    total: u64,
}

impl CpuCoresCollector {
    pub fn new() -> Self {
        Self {
            last: read_core_times().unwrap_or_default(),
        }
    }
}

impl Collector for CpuCoresCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::CpuCores
    }

    fn collect(&mut self) -> Option<MetricValues> {
        let current = read_core_times()?;
        if current.is_empty() {
            return None;
        }

        let per_core = if self.last.len() == current.len() {
            current
                .iter()
                .zip(&self.last)
                .map(|(cur, prev)| core_load(*prev, *cur))
                .collect()
        } else {
            // Baseline missing or core count changed; re-anchor.
            vec![0.0; current.len()]
        };
        self.last = current;

        Some(MetricValues::CpuCores { per_core })
    }
}

fn core_load(prev: CoreTimes, cur: CoreTimes) -> f32 {
    let total = cur.total.saturating_sub(prev.total);
    if total == 0 {
        return 0.0;
    }
    let idle = cur.idle.saturating_sub(prev.idle);
    let load = 100.0 * (1.0 - idle as f64 / total as f64);
    load.clamp(0.0, 100.0) as f32
}

fn read_core_times() -> Option<Vec<CoreTimes>> {
    Some(parse_proc_stat(&fs::read_to_string("/proc/stat").ok()?))
}

/// Extract (idle, total) jiffies per `cpuN` line of `/proc/stat`. The
/// aggregate `cpu ` line is skipped; idle is the 4th time column.
fn parse_proc_stat(content: &str) -> Vec<CoreTimes> {
    content
        .lines()
        .filter(|line| {
            line.starts_with("cpu") && line.as_bytes().get(3).is_some_and(u8::is_ascii_digit)
        })
        .map(|line| {
            let mut idle = 0;
            let mut total = 0;
            for (i, field) in line.split_whitespace().skip(1).enumerate() {
                let time: u64 = field.parse().unwrap_or(0);
                if i == 3 {
                    idle = time;
                }
                total += time;
            }
            CoreTimes { idle, total }
        })
        .collect()
}

/// One-shot per-core usage: two reads 100 ms apart, since a single read
/// only gives totals since boot. Blocks for the polling gap, so this is
/// for ad-hoc queries, not the sampling path.
pub fn instant_cpu_usage() -> Option<Vec<f32>> {
    let mut collector = CpuCoresCollector::new();
    std::thread::sleep(std::time::Duration::from_millis(100));
    match collector.collect()? {
        MetricValues::CpuCores { per_core } => Some(per_core),
        _ => None,
    }
}
