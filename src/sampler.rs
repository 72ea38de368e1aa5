use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::collectors::Collector;
use crate::event::{LogEvent, Sample, SessionClock};
use crate::stats::SessionStats;
use crate::writer::EventLog;

// ─── Sampler ─────────────────────────────────────────────────────

/// The background sampling thread: wakes every period, asks each active
/// collector for a snapshot, and forwards timestamped samples to the
/// writer. Exactly one runs per session.
///
/// `stop()` signals the condvar and joins, so by the time it returns the
/// loop has exited and no in-flight collect can still produce a sample.
pub(crate) struct Sampler {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

struct Shared {
    stop: Mutex<bool>,
    wakeup: Condvar,
}

impl Sampler {
    pub fn spawn(
        period: Duration,
        collectors: Vec<Box<dyn Collector>>,
        writer: Arc<EventLog>,
        clock: SessionClock,
        stats: Arc<SessionStats>,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            stop: Mutex::new(false),
            wakeup: Condvar::new(),
        });

        let loop_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("procpulse-sampler".into())
            .spawn(move || run_loop(period, collectors, writer, clock, stats, loop_shared))?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Signal the loop to exit and wait for it. Cancellation is prompt:
    /// the periodic wait is condvar-based, so a sleeping sampler wakes
    /// immediately rather than finishing its period.
    pub fn stop(mut self) {
        *self.shared.stop.lock() = true;
        self.shared.wakeup.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(
    period: Duration,
    mut collectors: Vec<Box<dyn Collector>>,
    writer: Arc<EventLog>,
    clock: SessionClock,
    stats: Arc<SessionStats>,
    shared: Arc<Shared>,
) {
    // Subtract each tick's own cost from the next wait so the cadence
    // tracks the configured period instead of period + tick time.
    let mut wait = period;

    loop {
        {
            let mut stop = shared.stop.lock();
            if !*stop {
                let _ = shared.wakeup.wait_for(&mut stop, wait);
            }
            if *stop {
                break;
            }
        }

        let tick_started = Instant::now();
        tick(&mut collectors, &writer, clock, &stats);

        wait = period.saturating_sub(tick_started.elapsed());
        if wait.is_zero() {
            // A tick slower than the period must not turn into a busy
            // loop; skip ahead instead of trying to catch up.
            wait = Duration::from_millis(1);
        }
    }
}

fn tick(
    collectors: &mut Vec<Box<dyn Collector>>,
    writer: &EventLog,
    clock: SessionClock,
    stats: &SessionStats,
) {
    collectors.retain_mut(|collector| {
        let at = clock.now();
        match collector.collect() {
            Some(values) => {
                stats.count_sample(values.kind());
                writer.write(&LogEvent::Sample(Sample { at, values }));
                true
            }
            None => {
                // First failure disables the collector for the rest of
                // the session; its samples are simply absent thereafter.
                tracing::warn!(
                    kind = ?collector.kind(),
                    "metric collector unavailable, disabling for this session"
                );
                stats.collector_failure();
                false
            }
        }
    });
}
