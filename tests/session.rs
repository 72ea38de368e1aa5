//! End-to-end session tests: drive the public API, then read the log
//! back as JSON lines and check what actually landed in the sink.

use std::io;
use std::path::Path;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;

use procpulse::{
    GpuMonitor, GpuReading, IntervalError, Profiler, ProfilerConfig,
};

fn read_events(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("log file readable")
        .lines()
        .map(|line| serde_json::from_str(line).expect("every record is one valid JSON line"))
        .collect()
}

fn events_of_kind<'a>(events: &'a [Value], kind: &str) -> Vec<&'a Value> {
    events.iter().filter(|e| e["kind"] == kind).collect()
}

fn samples_of_metric<'a>(events: &'a [Value], metric: &str) -> Vec<&'a Value> {
    events
        .iter()
        .filter(|e| e["kind"] == "sample" && e["metric"] == metric)
        .collect()
}

// ─── Sampling cadence ────────────────────────────────────────────

#[test]
fn sample_count_tracks_the_period() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_millis(50)))
        .unwrap();
    profiler.start().unwrap();
    std::thread::sleep(Duration::from_millis(300));
    let summary = profiler.stop().unwrap();

    // ~6 ticks of a 50 ms period over 300 ms, with scheduler jitter.
    let events = read_events(&path);
    let cpu = samples_of_metric(&events, "cpu").len();
    let mem = samples_of_metric(&events, "proc_mem").len();
    assert!((3..=9).contains(&cpu), "cpu samples: {cpu}");
    assert!((3..=9).contains(&mem), "proc_mem samples: {mem}");

    assert_eq!(
        summary.sample_count(procpulse::MetricKind::Cpu),
        cpu as u64
    );
}

#[test]
fn log_opens_with_a_meta_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_millis(40)))
        .unwrap();
    profiler.start().unwrap();
    profiler.stop().unwrap();

    let events = read_events(&path);
    assert_eq!(events[0]["kind"], "meta");
    assert_eq!(events[0]["pid"], std::process::id());
    assert_eq!(events[0]["period_ms"], 40);
    assert!(events[0]["session"].as_str().is_some());
}

// ─── Intervals ───────────────────────────────────────────────────

#[test]
fn one_begin_end_pair_yields_one_exact_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_secs(60)))
        .unwrap();
    profiler.start().unwrap();

    profiler.time_begin("alloc_mem");
    std::thread::sleep(Duration::from_millis(30));
    profiler.time_end("alloc_mem").unwrap();
    profiler.stop().unwrap();

    let events = read_events(&path);
    let intervals = events_of_kind(&events, "interval");
    assert_eq!(intervals.len(), 1);

    let record = intervals[0];
    assert_eq!(record["name"], "alloc_mem");
    let end_mono = record["mono_us"].as_u64().unwrap();
    let start_mono = record["start_mono_us"].as_u64().unwrap();
    let duration = record["duration_us"].as_u64().unwrap();
    assert!(end_mono >= start_mono);
    assert_eq!(duration, end_mono - start_mono);
    assert!(duration >= 25_000, "slept 30 ms but recorded {duration} us");
}

#[test]
fn unmatched_end_is_an_error_not_a_crash() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler.configure(ProfilerConfig::new(&path)).unwrap();
    profiler.start().unwrap();

    assert!(matches!(
        profiler.time_end("never_begun"),
        Err(IntervalError::UnmatchedEnd { .. })
    ));

    // One real pair still works afterwards.
    profiler.time_begin("real");
    profiler.time_end("real").unwrap();
    profiler.stop().unwrap();

    let events = read_events(&path);
    assert_eq!(events_of_kind(&events, "interval").len(), 1);
}

#[test]
fn same_name_nesting_is_lifo_through_the_public_api() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_secs(60)))
        .unwrap();
    profiler.start().unwrap();

    profiler.time_begin("work");
    std::thread::sleep(Duration::from_millis(20));
    profiler.time_begin("work");
    std::thread::sleep(Duration::from_millis(20));
    profiler.time_end("work").unwrap(); // closes the inner begin
    std::thread::sleep(Duration::from_millis(20));
    profiler.time_end("work").unwrap(); // closes the outer begin
    profiler.stop().unwrap();

    let events = read_events(&path);
    let intervals = events_of_kind(&events, "interval");
    assert_eq!(intervals.len(), 2);

    let first = intervals[0]["duration_us"].as_u64().unwrap();
    let second = intervals[1]["duration_us"].as_u64().unwrap();
    // Inner interval completes (and is written) first and is shorter.
    assert!(first < second, "inner {first} us vs outer {second} us");
}

#[test]
fn concurrent_threads_each_produce_their_own_intervals() {
    const THREADS: usize = 8;
    const PAIRS: usize = 25;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_millis(20)))
        .unwrap();
    profiler.start().unwrap();

    std::thread::scope(|scope| {
        for t in 0..THREADS {
            let profiler = &profiler;
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                for i in 0..PAIRS {
                    let name = format!("t{t}_step{i}");
                    profiler.time_begin(&name);
                    std::thread::sleep(Duration::from_micros(rng.gen_range(50..500)));
                    profiler.time_end(&name).unwrap();
                }
            });
        }
    });
    let summary = profiler.stop().unwrap();

    let events = read_events(&path);
    let intervals = events_of_kind(&events, "interval");
    assert_eq!(intervals.len(), THREADS * PAIRS);

    // Every record survived the concurrency intact.
    for record in &intervals {
        let name = record["name"].as_str().unwrap();
        assert!(name.starts_with('t'));
        let end = record["mono_us"].as_u64().unwrap();
        let start = record["start_mono_us"].as_u64().unwrap();
        assert_eq!(record["duration_us"].as_u64().unwrap(), end - start);
    }
    assert_eq!(summary.intervals.len(), THREADS * PAIRS);
    assert_eq!(summary.write_errors, 0);
}

// ─── Shutdown guarantees ─────────────────────────────────────────

#[test]
fn nothing_reaches_the_sink_after_stop_returns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_millis(10)))
        .unwrap();
    profiler.start().unwrap();
    profiler.mark("checkpoint");
    std::thread::sleep(Duration::from_millis(60));
    profiler.stop().unwrap();

    let after_stop = std::fs::read(&path).unwrap();
    assert!(!after_stop.is_empty());

    // Marker calls on a stopped engine and plain time passing must not
    // grow the file.
    profiler.mark("too_late");
    profiler.time_begin("too_late");
    assert!(profiler.time_end("too_late").is_err());
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(std::fs::read(&path).unwrap(), after_stop);
}

// ─── GPU ─────────────────────────────────────────────────────────

#[test]
fn gpu_disabled_means_zero_gpu_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(
            ProfilerConfig::new(&path)
                .period(Duration::from_millis(20))
                .enable_gpu(false),
        )
        .unwrap();
    profiler.start().unwrap();
    std::thread::sleep(Duration::from_millis(120));
    profiler.stop().unwrap();

    let events = read_events(&path);
    assert!(!events.is_empty());
    assert_eq!(samples_of_metric(&events, "gpu").len(), 0);
}

/// Scripted monitor standing in for a vendor SDK.
struct FakeGpu {
    fail_start: bool,
}

impl GpuMonitor for FakeGpu {
    fn start(&mut self, _period: Duration) -> io::Result<()> {
        if self.fail_start {
            Err(io::Error::new(io::ErrorKind::NotFound, "no device"))
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) {}

    fn reading(&self) -> Option<GpuReading> {
        Some(GpuReading {
            usage_pct: 37.5,
            mem_used_kb: 2048,
            mem_total_kb: 8192,
        })
    }
}

#[test]
fn injected_gpu_monitor_feeds_gpu_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(
            ProfilerConfig::new(&path)
                .period(Duration::from_millis(20))
                .enable_gpu(true),
        )
        .unwrap();
    profiler
        .set_gpu_monitor(Box::new(FakeGpu { fail_start: false }))
        .unwrap();
    profiler.start().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    profiler.stop().unwrap();

    let events = read_events(&path);
    let gpu = samples_of_metric(&events, "gpu");
    assert!(!gpu.is_empty());
    assert_eq!(gpu[0]["usage_pct"], 37.5);
    assert_eq!(gpu[0]["mem_used_kb"], 2048);
}

#[test]
fn unavailable_gpu_monitor_degrades_gracefully() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(
            ProfilerConfig::new(&path)
                .period(Duration::from_millis(20))
                .enable_gpu(true),
        )
        .unwrap();
    profiler
        .set_gpu_monitor(Box::new(FakeGpu { fail_start: true }))
        .unwrap();

    // start() must succeed with GPU silently absent.
    profiler.start().unwrap();
    std::thread::sleep(Duration::from_millis(100));
    profiler.stop().unwrap();

    let events = read_events(&path);
    assert_eq!(samples_of_metric(&events, "gpu").len(), 0);
    assert!(!samples_of_metric(&events, "cpu").is_empty());
}

// ─── Markers ─────────────────────────────────────────────────────

#[test]
fn marks_are_recorded_as_instant_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_secs(60)))
        .unwrap();
    profiler.start().unwrap();
    profiler.mark("phase_one_done");
    profiler.stop().unwrap();

    let events = read_events(&path);
    let markers = events_of_kind(&events, "marker");
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0]["name"], "phase_one_done");
}

// ─── Full scenario ───────────────────────────────────────────────

#[test]
fn scenario_one_second_run_with_a_600ms_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.log");

    let profiler = Profiler::new();
    profiler
        .configure(ProfilerConfig::new(&path).period(Duration::from_millis(200)))
        .unwrap();
    profiler.start().unwrap();

    std::thread::sleep(Duration::from_millis(200));
    profiler.time_begin("alloc_mem");
    std::thread::sleep(Duration::from_millis(600));
    profiler.time_end("alloc_mem").unwrap();
    std::thread::sleep(Duration::from_millis(200));

    let summary = profiler.stop().unwrap();

    let events = read_events(&path);
    let cpu = samples_of_metric(&events, "cpu").len();
    let mem = samples_of_metric(&events, "proc_mem").len();
    assert!((2..=8).contains(&cpu), "cpu samples: {cpu}");
    assert!((2..=8).contains(&mem), "proc_mem samples: {mem}");

    let intervals = events_of_kind(&events, "interval");
    assert_eq!(intervals.len(), 1);
    let duration = intervals[0]["duration_us"].as_u64().unwrap();
    assert!(
        (550_000..=900_000).contains(&duration),
        "expected ~600 ms, got {duration} us"
    );

    let alloc = summary.interval("alloc_mem").unwrap();
    assert_eq!(alloc.durations_us.count, 1);
}
