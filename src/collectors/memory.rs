use std::fs;

use crate::event::{MetricKind, MetricValues, ProcessMemory, SystemMemory};

use super::Collector;

// ─── Process memory ──────────────────────────────────────────────

pub(crate) struct ProcessMemoryCollector;

impl Collector for ProcessMemoryCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::ProcMem
    }

    fn collect(&mut self) -> Option<MetricValues> {
        process_memory().map(MetricValues::ProcMem)
    }
}

/// Current process memory. Prefers `/proc/self/status` (field names are
/// explicit); falls back to page counts from `/proc/self/statm` on
/// kernels without the Rss* breakdown.
pub fn process_memory() -> Option<ProcessMemory> {
    if let Some(mem) = fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|content| parse_status(&content))
    {
        return Some(mem);
    }
    fs::read_to_string("/proc/self/statm")
        .ok()
        .and_then(|content| parse_statm(&content, page_kb()))
}

fn page_kb() -> u64 {
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page > 0 {
        page as u64 / 1024
    } else {
        4
    }
}

/// Parse `VmRSS` / `VmSize` / `RssFile` / `RssShmem` out of
/// `/proc/[pid]/status`. Lines look like `VmRSS:\t   1024 kB`.
fn parse_status(content: &str) -> Option<ProcessMemory> {
    let mut rss_kb = None;
    let mut vm_kb = None;
    let mut rss_file = None;
    let mut rss_shmem = None;

    for line in content.lines() {
        let target = match line.split(':').next() {
            Some("VmRSS") => &mut rss_kb,
            Some("VmSize") => &mut vm_kb,
            Some("RssFile") => &mut rss_file,
            Some("RssShmem") => &mut rss_shmem,
            _ => continue,
        };
        *target = line.split_whitespace().nth(1).and_then(|v| v.parse().ok());
    }

    Some(ProcessMemory {
        rss_kb: rss_kb?,
        // RssFile/RssShmem are absent on older kernels; report what we have.
        shared_kb: rss_file.unwrap_or(0) + rss_shmem.unwrap_or(0),
        vm_kb: vm_kb.unwrap_or(0),
    })
}

/// `/proc/[pid]/statm` fallback: `size resident shared ...` in pages.
fn parse_statm(content: &str, page_kb: u64) -> Option<ProcessMemory> {
    let mut fields = content.split_whitespace();
    let size: u64 = fields.next()?.parse().ok()?;
    let resident: u64 = fields.next()?.parse().ok()?;
    let shared: u64 = fields.next()?.parse().ok()?;
    Some(ProcessMemory {
        rss_kb: resident * page_kb,
        shared_kb: shared * page_kb,
        vm_kb: size * page_kb,
    })
}

// ─── System memory ───────────────────────────────────────────────

pub(crate) struct SystemMemoryCollector;

impl Collector for SystemMemoryCollector {
    fn kind(&self) -> MetricKind {
        MetricKind::SysMem
    }

    fn collect(&mut self) -> Option<MetricValues> {
        system_memory().map(MetricValues::SysMem)
    }
}

/// System-wide memory from `/proc/meminfo`.
pub fn system_memory() -> Option<SystemMemory> {
    fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|content| parse_meminfo(&content))
}

fn parse_meminfo(content: &str) -> Option<SystemMemory> {
    let mut total = None;
    let mut available = None;
    let mut free = None;

    for line in content.lines() {
        let target = match line.split(':').next() {
            Some("MemTotal") => &mut total,
            Some("MemAvailable") => &mut available,
            Some("MemFree") => &mut free,
            _ => continue,
        };
        *target = line.split_whitespace().nth(1).and_then(|v| v.parse().ok());
    }

    Some(SystemMemory {
        total_kb: total?,
        available_kb: available.unwrap_or(0),
        free_kb: free.unwrap_or(0),
    })
}
