use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::event::LogEvent;

/// Number of files the log rotates across when a size cap is set.
const ROTATING_FILES: usize = 2;

// ─── Event log ───────────────────────────────────────────────────

/// Append-only event sink: one JSON object per line, safe for the
/// sampler thread and any number of marker threads to hit concurrently.
/// Each record is serialized outside the lock and written in one call,
/// so lines never interleave.
///
/// I/O failures never propagate to producers: they bump a counter, keep
/// the last error string for `health()`, and the engine keeps running in
/// record-loss mode.
pub(crate) struct EventLog {
    inner: Mutex<Option<LogFile>>,
    write_errors: AtomicU64,
    dropped: AtomicU64,
    warned: AtomicBool,
    last_error: Mutex<Option<String>>,
}

struct LogFile {
    out: BufWriter<File>,
    /// One entry without a cap, two rotating entries with one.
    paths: Vec<PathBuf>,
    current_idx: usize,
    current_size: u64,
    /// Per-file byte cap (total cap split across the rotating files).
    cap_per_file: Option<u64>,
}

impl EventLog {
    /// Open (and truncate) the sink. With `max_bytes` set, events rotate
    /// across `<stem>_0.<ext>` and `<stem>_1.<ext>`, each holding half
    /// the cap, so recent events overwrite the oldest file.
    pub fn create(path: &Path, max_bytes: Option<u64>) -> io::Result<Self> {
        let (paths, cap_per_file) = match max_bytes {
            Some(cap) => (rotation_paths(path), Some(cap / ROTATING_FILES as u64)),
            None => (vec![path.to_path_buf()], None),
        };

        let out = BufWriter::new(File::create(&paths[0])?);
        Ok(Self {
            inner: Mutex::new(Some(LogFile {
                out,
                paths,
                current_idx: 0,
                current_size: 0,
                cap_per_file,
            })),
            write_errors: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            warned: AtomicBool::new(false),
            last_error: Mutex::new(None),
        })
    }

    /// Append one record. Never blocks beyond the write itself, never
    /// panics, never returns an error to the producer.
    pub fn write(&self, event: &LogEvent) {
        let line = match serde_json::to_string(event) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => {
                self.note_failure(format!("serialize: {e}"));
                return;
            }
        };

        let mut guard = self.inner.lock();
        let Some(file) = guard.as_mut() else {
            // Sink already closed by stop(); count the loss so the
            // nothing-after-stop guarantee stays observable.
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        if let Err(e) = file.append(&line) {
            drop(guard);
            self.note_failure(e.to_string());
        }
    }

    /// Final flush; all subsequent writes are dropped (and counted).
    pub fn close(&self) {
        if let Some(mut file) = self.inner.lock().take() {
            if let Err(e) = file.out.flush() {
                self.note_failure(format!("final flush: {e}"));
            }
        }
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn note_failure(&self, reason: String) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("event log write failed, continuing without this record: {reason}");
        }
        *self.last_error.lock() = Some(reason);
    }
}

impl LogFile {
    fn append(&mut self, line: &str) -> io::Result<()> {
        if let Some(cap) = self.cap_per_file {
            if self.current_size + line.len() as u64 > cap {
                self.rotate()?;
            }
        }
        self.out.write_all(line.as_bytes())?;
        // Flush per record: the log must survive an abrupt host exit.
        self.out.flush()?;
        self.current_size += line.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.current_idx = (self.current_idx + 1) % self.paths.len();
        self.out = BufWriter::new(File::create(&self.paths[self.current_idx])?);
        self.current_size = 0;
        Ok(())
    }
}

/// `run.log` with a cap becomes `run_0.log` / `run_1.log`.
fn rotation_paths(path: &Path) -> Vec<PathBuf> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "events".to_owned());
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    (0..ROTATING_FILES)
        .map(|i| parent.join(format!("{stem}_{i}{ext}")))
        .collect()
}
