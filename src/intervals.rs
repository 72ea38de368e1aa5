use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::IntervalError;
use crate::event::{Interval, Timestamps};

// ─── Thread tags ─────────────────────────────────────────────────

static NEXT_THREAD_TAG: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TAG: u64 = NEXT_THREAD_TAG.fetch_add(1, Ordering::Relaxed);
}

/// Small numeric id for the calling thread, assigned on first use.
/// Stable for the thread's lifetime, compact enough to serialize into
/// every interval record.
pub(crate) fn thread_tag() -> u64 {
    THREAD_TAG.with(|tag| *tag)
}

// ─── Tracker ─────────────────────────────────────────────────────

/// Open begin/end markers, keyed by (name, thread tag) so the same name
/// used concurrently on different threads never collides. Same-name
/// nesting on one thread is a LIFO stack: the innermost begin is the one
/// an end closes.
///
/// Runs entirely on the caller's thread; every operation is one hash
/// lookup under a single mutex.
pub(crate) struct IntervalTracker {
    open: Mutex<HashMap<(String, u64), Vec<u64>>>,
}

impl IntervalTracker {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Record the start of a named span on the calling thread.
    pub fn begin(&self, name: &str, now: Timestamps) -> Result<(), IntervalError> {
        if name.is_empty() {
            return Err(IntervalError::EmptyName);
        }
        let key = (name.to_owned(), thread_tag());
        self.open.lock().entry(key).or_default().push(now.mono_us);
        Ok(())
    }

    /// Close the most recent open span for (name, calling thread) and
    /// produce the completed interval.
    pub fn end(&self, name: &str, now: Timestamps) -> Result<Interval, IntervalError> {
        if name.is_empty() {
            return Err(IntervalError::EmptyName);
        }
        let tag = thread_tag();
        let start_mono_us = {
            let mut open = self.open.lock();
            let key = (name.to_owned(), tag);
            let Some(stack) = open.get_mut(&key) else {
                return Err(IntervalError::UnmatchedEnd { name: name.into() });
            };
            let Some(start) = stack.pop() else {
                return Err(IntervalError::UnmatchedEnd { name: name.into() });
            };
            if stack.is_empty() {
                open.remove(&key);
            }
            start
        };

        Ok(Interval {
            at: now,
            name: name.to_owned(),
            thread: tag,
            start_mono_us,
            duration_us: now.mono_us.saturating_sub(start_mono_us),
        })
    }

    /// Number of currently open spans across all threads.
    pub fn open_count(&self) -> usize {
        self.open.lock().values().map(Vec::len).sum()
    }

    /// Drop all open spans. Called when a session ends so stale begins
    /// cannot leak into the next session.
    pub fn clear(&self) {
        self.open.lock().clear();
    }
}
