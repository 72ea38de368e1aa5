use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::collectors::{self, EnabledKinds, GpuMonitor, NvidiaSmiMonitor};
use crate::error::{ConfigError, IntervalError, StartError, StopError};
use crate::event::{LogEvent, Marker, SessionClock, SessionMeta};
use crate::intervals::{thread_tag, IntervalTracker};
use crate::sampler::Sampler;
use crate::stats::{SessionStats, SessionSummary};
use crate::writer::EventLog;

/// How long start() waits for an enabled GPU monitor to produce its
/// first reading before giving up on GPU collection for the session.
const GPU_WARMUP_POLLS: u32 = 20;
const GPU_WARMUP_POLL_INTERVAL: Duration = Duration::from_millis(25);

// ─── Configuration ───────────────────────────────────────────────

/// Validated session configuration. Built up with the chained setters,
/// checked at `configure()` / `start()`, immutable while running.
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    output: PathBuf,
    period: Duration,
    cpu: bool,
    cpu_cores: bool,
    proc_mem: bool,
    sys_mem: bool,
    gpu: bool,
    max_log_bytes: Option<u64>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("procpulse.log"),
            period: Duration::from_millis(500),
            cpu: true,
            cpu_cores: false,
            proc_mem: true,
            sys_mem: false,
            gpu: false,
            max_log_bytes: None,
        }
    }
}

impl ProfilerConfig {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    /// Sampling period. Must be strictly positive.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn enable_cpu(mut self, on: bool) -> Self {
        self.cpu = on;
        self
    }

    /// Per-core system CPU load in addition to process CPU.
    pub fn enable_cpu_cores(mut self, on: bool) -> Self {
        self.cpu_cores = on;
        self
    }

    pub fn enable_process_memory(mut self, on: bool) -> Self {
        self.proc_mem = on;
        self
    }

    pub fn enable_system_memory(mut self, on: bool) -> Self {
        self.sys_mem = on;
        self
    }

    pub fn enable_gpu(mut self, on: bool) -> Self {
        self.gpu = on;
        self
    }

    /// Cap the log's total size; events rotate across two files, the
    /// newest overwriting the oldest.
    pub fn max_log_bytes(mut self, bytes: u64) -> Self {
        self.max_log_bytes = Some(bytes);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.period.is_zero() {
            return Err(ConfigError::InvalidPeriod);
        }
        if self.output.as_os_str().is_empty() {
            return Err(ConfigError::EmptyOutputPath);
        }
        if let Some(cap) = self.max_log_bytes {
            // Each rotating file holds half the cap and must fit at
            // least one full record.
            if cap < 512 {
                return Err(ConfigError::InvalidCapSize(cap));
            }
        }
        Ok(())
    }
}

// ─── Health side channel ─────────────────────────────────────────

/// Counters for everything that went wrong without being allowed to
/// crash anything. Queryable while the session runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineHealth {
    pub write_errors: u64,
    pub dropped_records: u64,
    pub collector_failures: u64,
    pub last_write_error: Option<String>,
}

// ─── Profiler ────────────────────────────────────────────────────

/// The profiling engine facade: configure, start, mark intervals from
/// any thread, stop. One instance per independent profiling session
/// lifecycle — there is no process-wide state, so tests and embedders
/// can run as many instances as they like.
///
/// All methods take `&self`; the engine is safe to share behind an
/// `Arc` or a `static`.
pub struct Profiler {
    config: Mutex<ProfilerConfig>,
    session: Mutex<Option<Session>>,
    running: AtomicBool,
    tracker: IntervalTracker,
    /// Injected GPU monitor waiting for the next start(). Returned here
    /// after stop() so one injection serves repeated sessions.
    gpu_slot: Mutex<Option<Box<dyn GpuMonitor>>>,
}

struct Session {
    writer: Arc<EventLog>,
    clock: SessionClock,
    sampler: Sampler,
    stats: Arc<SessionStats>,
    gpu: Option<Arc<Mutex<Box<dyn GpuMonitor>>>>,
}

impl Default for Profiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self {
            config: Mutex::new(ProfilerConfig::default()),
            session: Mutex::new(None),
            running: AtomicBool::new(false),
            tracker: IntervalTracker::new(),
            gpu_slot: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Configuration (stopped only) ────────────────────────────

    /// Replace the whole configuration. Rejected while running.
    pub fn configure(&self, config: ProfilerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if self.session.lock().is_some() {
            return Err(ConfigError::Running);
        }
        *self.config.lock() = config;
        Ok(())
    }

    /// Change only the sampling period. Rejected while running — a live
    /// period change is explicitly not supported.
    pub fn set_period(&self, period: Duration) -> Result<(), ConfigError> {
        if period.is_zero() {
            return Err(ConfigError::InvalidPeriod);
        }
        if self.session.lock().is_some() {
            return Err(ConfigError::Running);
        }
        self.config.lock().period = period;
        Ok(())
    }

    /// Inject a custom GPU monitor used by the next `start()` when GPU
    /// collection is enabled. Replaces the built-in `nvidia-smi` probe.
    pub fn set_gpu_monitor(&self, monitor: Box<dyn GpuMonitor>) -> Result<(), ConfigError> {
        if self.session.lock().is_some() {
            return Err(ConfigError::Running);
        }
        *self.gpu_slot.lock() = Some(monitor);
        Ok(())
    }

    // ── Lifecycle ───────────────────────────────────────────────

    /// Open the sink, write the session header, bring up the collector
    /// set, and launch the sampler thread.
    pub fn start(&self) -> Result<(), StartError> {
        let mut session = self.session.lock();
        if session.is_some() {
            return Err(StartError::AlreadyRunning);
        }

        let config = self.config.lock().clone();
        config.validate()?;

        let writer = Arc::new(
            EventLog::create(&config.output, config.max_log_bytes).map_err(|e| {
                StartError::Sink {
                    path: config.output.clone(),
                    reason: e.to_string(),
                }
            })?,
        );
        let clock = SessionClock::start();
        let stats = Arc::new(SessionStats::new());

        writer.write(&LogEvent::Meta(SessionMeta {
            at: clock.now(),
            session: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            period_ms: config.period.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }));

        let gpu = if config.gpu {
            self.bring_up_gpu(config.period)
        } else {
            None
        };

        let set = collectors::build_set(
            EnabledKinds {
                cpu: config.cpu,
                cpu_cores: config.cpu_cores,
                proc_mem: config.proc_mem,
                sys_mem: config.sys_mem,
            },
            gpu.clone(),
        );

        let sampler = Sampler::spawn(
            config.period,
            set,
            Arc::clone(&writer),
            clock,
            Arc::clone(&stats),
        )
        .map_err(|e| {
            writer.close();
            StartError::Scheduler(e.to_string())
        })?;

        self.running.store(true, Ordering::SeqCst);
        *session = Some(Session {
            writer,
            clock,
            sampler,
            stats,
            gpu,
        });
        Ok(())
    }

    /// Halt the sampler (clean join), close the sink (final flush), and
    /// report the session summary. A second stop is an explicit error.
    /// Once this returns, no further record can reach the sink.
    pub fn stop(&self) -> Result<SessionSummary, StopError> {
        let mut session = self.session.lock();
        let sess = session.take().ok_or(StopError::NotRunning)?;
        self.running.store(false, Ordering::SeqCst);

        sess.sampler.stop();

        if let Some(gpu) = sess.gpu {
            // The sampler is joined, so the session's collector clone is
            // gone and the monitor can be reclaimed for the next start.
            if let Ok(mutex) = Arc::try_unwrap(gpu) {
                let mut monitor = mutex.into_inner();
                monitor.stop();
                *self.gpu_slot.lock() = Some(monitor);
            }
        }

        let summary = sess
            .stats
            .summary(sess.writer.write_errors(), sess.writer.dropped());
        sess.writer.close();

        let leaked = self.tracker.open_count();
        if leaked > 0 {
            tracing::warn!("{leaked} interval(s) still open at stop, dropping them");
        }
        self.tracker.clear();
        Ok(summary)
    }

    // ── Interval marking (any thread) ───────────────────────────

    /// Open a named span on the calling thread. Same-name nesting
    /// stacks (LIFO). A no-op while no session is running or when the
    /// name is empty.
    pub fn time_begin(&self, name: &str) {
        let now = {
            match self.session.lock().as_ref() {
                Some(sess) => sess.clock.now(),
                None => return,
            }
        };
        let _ = self.tracker.begin(name, now);
    }

    /// Close the most recent open span for (name, calling thread) and
    /// record the completed interval.
    pub fn time_end(&self, name: &str) -> Result<(), IntervalError> {
        let (now, writer, stats) = {
            match self.session.lock().as_ref() {
                Some(sess) => (
                    sess.clock.now(),
                    Arc::clone(&sess.writer),
                    Arc::clone(&sess.stats),
                ),
                None => {
                    return Err(IntervalError::UnmatchedEnd {
                        name: name.to_owned(),
                    })
                }
            }
        };

        let interval = self.tracker.end(name, now)?;
        stats.record_interval(&interval.name, interval.duration_us);
        writer.write(&LogEvent::Interval(interval));
        Ok(())
    }

    /// Record an instant named event with no duration. Dropped while no
    /// session is running.
    pub fn mark(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        let (now, writer) = {
            match self.session.lock().as_ref() {
                Some(sess) => (sess.clock.now(), Arc::clone(&sess.writer)),
                None => return,
            }
        };
        writer.write(&LogEvent::Marker(Marker {
            at: now,
            name: name.to_owned(),
            thread: thread_tag(),
        }));
    }

    // ── Side channel ────────────────────────────────────────────

    /// Error counters for the running session; zeroed when stopped.
    pub fn health(&self) -> EngineHealth {
        match self.session.lock().as_ref() {
            Some(sess) => EngineHealth {
                write_errors: sess.writer.write_errors(),
                dropped_records: sess.writer.dropped(),
                collector_failures: sess.stats.collector_failures(),
                last_write_error: sess.writer.last_error(),
            },
            None => EngineHealth::default(),
        }
    }

    fn bring_up_gpu(&self, period: Duration) -> Option<Arc<Mutex<Box<dyn GpuMonitor>>>> {
        let mut monitor = self
            .gpu_slot
            .lock()
            .take()
            .unwrap_or_else(|| Box::new(NvidiaSmiMonitor::new()) as Box<dyn GpuMonitor>);

        if let Err(e) = monitor.start(period) {
            tracing::warn!("GPU monitoring disabled for this session: {e}");
            return None;
        }

        // Wait briefly for the first reading; a monitor that cannot
        // produce one at startup is dropped rather than polled forever.
        for _ in 0..GPU_WARMUP_POLLS {
            if monitor.reading().is_some() {
                return Some(Arc::new(Mutex::new(monitor)));
            }
            std::thread::sleep(GPU_WARMUP_POLL_INTERVAL);
        }
        monitor.stop();
        tracing::warn!("GPU monitoring disabled for this session: no reading at startup");
        None
    }
}

impl Drop for Profiler {
    fn drop(&mut self) {
        // Best effort: never leave the sampler thread running past the
        // engine's lifetime.
        let _ = self.stop();
    }
}
