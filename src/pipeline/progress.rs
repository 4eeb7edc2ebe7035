use crate::error::Error;

use chrono::{TimeZone, Utc};
use std::io::Write;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressStyle {
    #[default]
    Bar,
    Simple,
    Spinner,
    None,
}

impl FromStr for ProgressStyle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "bar" => Ok(ProgressStyle::Bar),
            "simple" => Ok(ProgressStyle::Simple),
            "spinner" => Ok(ProgressStyle::Spinner),
            "none" => Ok(ProgressStyle::None),
            _ => Err(Error::Precondition(format!(
                "unknown progress style: {s} (valid: bar, simple, spinner, none)"
            ))),
        }
    }
}

const SPINNER_FRAMES: [char; 4] = ['|', '/', '-', '\\'];

/// Lock-free run telemetry shared between producers and the display thread.
///
/// The per-thread timestamp cells live in a boxed slice sized at start, so
/// they are never relocated; all counter traffic is relaxed since the
/// display only needs a consistent-enough snapshot.
pub struct ProgressTracker {
    start_timestamp_ns: u64,
    end_timestamp_ns: u64,
    thread_timestamps: Box<[AtomicU64]>,
    total_flows: AtomicU64,
    total_bytes: AtomicU64,
    started_at: Instant,
    shutdown: AtomicBool,
    spinner_frame: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(start_timestamp_ns: u64, end_timestamp_ns: u64, num_threads: usize) -> Self {
        let thread_timestamps = (0..num_threads)
            .map(|_| AtomicU64::new(start_timestamp_ns))
            .collect();
        ProgressTracker {
            start_timestamp_ns,
            end_timestamp_ns,
            thread_timestamps,
            total_flows: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            started_at: Instant::now(),
            shutdown: AtomicBool::new(false),
            spinner_frame: AtomicUsize::new(0),
        }
    }

    pub fn update_timestamp(&self, thread_index: usize, timestamp_ns: u64) {
        if let Some(cell) = self.thread_timestamps.get(thread_index) {
            cell.store(timestamp_ns, Ordering::Relaxed);
        }
    }

    pub fn add_flows(&self, count: u64) {
        self.total_flows.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn total_flows(&self) -> u64 {
        self.total_flows.load(Ordering::Relaxed)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// The slowest producer bounds the overall position.
    pub fn min_timestamp_ns(&self) -> u64 {
        self.thread_timestamps
            .iter()
            .map(|cell| cell.load(Ordering::Relaxed))
            .min()
            .unwrap_or(self.end_timestamp_ns)
    }

    /// Fraction of the configured timestamp range covered so far, in [0, 1].
    pub fn progress(&self) -> f64 {
        let span = self.end_timestamp_ns.saturating_sub(self.start_timestamp_ns);
        if span == 0 {
            return 1.0;
        }
        let covered = self.min_timestamp_ns().saturating_sub(self.start_timestamp_ns);
        (covered as f64 / span as f64).clamp(0.0, 1.0)
    }

    /// Flows per wall-clock second since the tracker was created.
    pub fn throughput(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.total_flows() as f64 / elapsed
    }

    pub fn bandwidth_gbps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        (self.total_bytes() as f64 * 8.0) / (elapsed * 1e9)
    }

    /// Remaining wall time extrapolated from progress so far. Zero before
    /// any progress exists and once the run is done.
    pub fn eta(&self) -> Duration {
        let progress = self.progress();
        if progress <= 0.0 || progress >= 1.0 {
            return Duration::ZERO;
        }
        let elapsed = self.started_at.elapsed();
        Duration::from_secs_f64(elapsed.as_secs_f64() / progress - elapsed.as_secs_f64())
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn render_line(&self, style: ProgressStyle) {
        let progress = self.progress();
        let mut err = std::io::stderr().lock();
        let line = match style {
            ProgressStyle::Simple => format!(
                "\rProgress: {:.1}% - {} flows - ETA: {}",
                progress * 100.0,
                format_count(self.total_flows()),
                format_duration(self.eta())
            ),
            ProgressStyle::Spinner => {
                let frame = self.spinner_frame.fetch_add(1, Ordering::Relaxed);
                format!(
                    "\r{} {:.1}% - {} flows - {:.0} flows/s",
                    SPINNER_FRAMES[frame % SPINNER_FRAMES.len()],
                    progress * 100.0,
                    format_count(self.total_flows()),
                    self.throughput()
                )
            }
            _ => return,
        };
        let _ = write!(err, "{line}");
        let _ = err.flush();
    }
}

/// Scale used for the bar position; a permille keeps single-percent moves
/// visible on a 40-column bar.
const BAR_SCALE: u64 = 1000;

fn bar_template(tracker: &Arc<ProgressTracker>) -> indicatif::ProgressStyle {
    let throughput_tracker = Arc::clone(tracker);
    let bandwidth_tracker = Arc::clone(tracker);
    indicatif::ProgressStyle::with_template(
        "[{bar:40}] {percent:>3}% | {msg} | {throughput} | {bandwidth}",
    )
    .expect("static progress template")
    .progress_chars("=> ")
    .with_key(
        "throughput",
        move |_state: &indicatif::ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.0} flows/s", throughput_tracker.throughput());
        },
    )
    .with_key(
        "bandwidth",
        move |_state: &indicatif::ProgressState, w: &mut dyn std::fmt::Write| {
            let _ = write!(w, "{:.2} Gbps", bandwidth_tracker.bandwidth_gbps());
        },
    )
}

/// Launch the display thread. It wakes on `interval`, redraws on stderr so
/// the record stream stays clean, and closes the line with one final
/// newline on shutdown. The `none` style spawns nothing.
pub fn spawn_display(
    tracker: Arc<ProgressTracker>,
    style: ProgressStyle,
    interval: Duration,
) -> Option<thread::JoinHandle<()>> {
    if style == ProgressStyle::None {
        return None;
    }
    let builder = thread::Builder::new().name("progress".into());
    let handle = builder
        .spawn(move || {
            log::trace!("progress display starts");
            match style {
                ProgressStyle::Bar => {
                    let bar = indicatif::ProgressBar::with_draw_target(
                        Some(BAR_SCALE),
                        indicatif::ProgressDrawTarget::stderr(),
                    );
                    bar.set_style(bar_template(&tracker));
                    while !tracker.shutdown_requested() {
                        thread::sleep(interval);
                        bar.set_position((tracker.progress() * BAR_SCALE as f64) as u64);
                        bar.set_message(format!(
                            "Time: {} | ETA: {}",
                            format_clock(tracker.min_timestamp_ns()),
                            format_duration(tracker.eta())
                        ));
                    }
                    bar.finish();
                }
                _ => {
                    while !tracker.shutdown_requested() {
                        thread::sleep(interval);
                        tracker.render_line(style);
                    }
                    tracker.render_line(style);
                }
            }
            eprintln!();
            log::trace!("progress display stops");
        })
        .expect("cannot spawn the progress thread");
    Some(handle)
}

fn format_clock(timestamp_ns: u64) -> String {
    let secs = (timestamp_ns / 1_000_000_000) as i64;
    match Utc.timestamp_opt(secs, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp_ns.to_string(),
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Rounded counts with K/M/G suffixes for the compact styles.
fn format_count(count: u64) -> String {
    if count < 1_000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{}K", count / 1_000)
    } else if count < 1_000_000_000 {
        format!("{}M", count / 1_000_000)
    } else {
        format!("{}G", count / 1_000_000_000)
    }
}
