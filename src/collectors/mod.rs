//! Metric collectors: one pluggable unit per resource kind, each able to
//! produce one snapshot of its metric on demand. Collectors are
//! polymorphic over that single capability, so the sampler never knows
//! which kinds exist.

pub(crate) mod cpu;
pub(crate) mod gpu;
pub(crate) mod memory;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::event::{MetricKind, MetricValues};

pub use cpu::instant_cpu_usage;
pub use gpu::{GpuMonitor, NvidiaSmiMonitor};
pub use memory::{process_memory, system_memory};

/// One metric source. `collect()` must be bounded-fast and must report
/// transient unavailability as `None` — never by panicking or blocking.
pub(crate) trait Collector: Send {
    fn kind(&self) -> MetricKind;
    fn collect(&mut self) -> Option<MetricValues>;
}

/// Which collectors a session runs. Fixed at start(), torn down at stop().
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnabledKinds {
    pub cpu: bool,
    pub cpu_cores: bool,
    pub proc_mem: bool,
    pub sys_mem: bool,
}

/// Instantiate the collector set for a session. The GPU handle is only
/// present when the monitor came up at start.
pub(crate) fn build_set(
    kinds: EnabledKinds,
    gpu: Option<Arc<Mutex<Box<dyn GpuMonitor>>>>,
) -> Vec<Box<dyn Collector>> {
    let mut set: Vec<Box<dyn Collector>> = Vec::new();
    if kinds.cpu {
        set.push(Box::new(cpu::CpuCollector::new()));
    }
    if kinds.cpu_cores {
        set.push(Box::new(cpu::CpuCoresCollector::new()));
    }
    if kinds.proc_mem {
        set.push(Box::new(memory::ProcessMemoryCollector));
    }
    if kinds.sys_mem {
        set.push(Box::new(memory::SystemMemoryCollector));
    }
    if let Some(monitor) = gpu {
        set.push(Box::new(gpu::GpuCollector::new(monitor)));
    }
    set
}
