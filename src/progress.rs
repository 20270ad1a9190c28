//! Download progress side channel.
//!
//! The fetch loop feeds byte counts into a [`ProgressTracker`], which throttles
//! them into [`ProgressSnapshot`]s for a [`ProgressReporter`]. Reporting is purely
//! observational and never influences the transfer.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use crate::util::{format_bytes, format_duration};

/// Minimum spacing between two reported updates (at most ~10 per second).
pub const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// A point-in-time view of a transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Bytes present at the destination, including any resumed prefix.
    pub transferred: u64,
    /// Total size when the server announced it.
    pub total: Option<u64>,
    pub elapsed: Duration,
    /// Bytes per second since the previous snapshot.
    pub throughput: f64,
    /// Only known when `total` is.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|t| *t > 0)
            .map(|t| self.transferred as f64 / t as f64 * 100.0)
    }
}

/// Receives progress updates.
pub trait ProgressReporter: Send + Sync {
    fn start(&self, _description: &str, _total: Option<u64>, _resumed_from: u64) {}
    fn update(&self, snapshot: &ProgressSnapshot);
    fn finish(&self, _snapshot: &ProgressSnapshot) {}
}

/// Discards all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn update(&self, _snapshot: &ProgressSnapshot) {}
}

struct TrackerState {
    transferred: u64,
    last_emit: Instant,
    last_emit_bytes: u64,
}

/// Mutex-guarded byte counter that rate-limits reports.
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    total: Option<u64>,
    started: Instant,
    interval: Duration,
    state: Mutex<TrackerState>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        reporter: &'a dyn ProgressReporter,
        description: &str,
        total: Option<u64>,
        already: u64,
    ) -> Self {
        reporter.start(description, total, already);
        let now = Instant::now();
        Self {
            reporter,
            total,
            started: now,
            interval: UPDATE_INTERVAL,
            state: Mutex::new(TrackerState {
                transferred: already,
                last_emit: now,
                last_emit_bytes: already,
            }),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Records `n` more bytes, reporting if the update interval has elapsed.
    pub fn advance(&self, n: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        state.transferred += n;
        let now = Instant::now();
        let since = now.duration_since(state.last_emit);
        if since < self.interval {
            return;
        }
        let snapshot = self.snapshot_at(&state, now, since);
        state.last_emit = now;
        state.last_emit_bytes = state.transferred;
        drop(state);
        self.reporter.update(&snapshot);
    }

    pub fn transferred(&self) -> u64 {
        self.state.lock().map(|s| s.transferred).unwrap_or(0)
    }

    /// Emits a final snapshot averaged over the whole transfer.
    pub fn finish(&self) -> ProgressSnapshot {
        let transferred = self.transferred();
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64().max(0.001);
        let snapshot = ProgressSnapshot {
            transferred,
            total: self.total,
            elapsed,
            throughput: transferred as f64 / secs,
            eta: self.total.map(|_| Duration::ZERO),
        };
        self.reporter.finish(&snapshot);
        snapshot
    }

    fn snapshot_at(&self, state: &TrackerState, now: Instant, since: Duration) -> ProgressSnapshot {
        let secs = since.as_secs_f64().max(0.001);
        let throughput = (state.transferred - state.last_emit_bytes) as f64 / secs;
        let eta = match self.total {
            Some(total) if throughput > 0.0 => {
                let remaining = total.saturating_sub(state.transferred) as f64;
                Some(Duration::from_secs_f64(remaining / throughput))
            }
            _ => None,
        };
        ProgressSnapshot {
            transferred: state.transferred,
            total: self.total,
            elapsed: now.duration_since(self.started),
            throughput,
            eta,
        }
    }
}

/// Terminal progress bar on stderr.
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn start(&self, description: &str, total: Option<u64>, resumed_from: u64) {
        self.bar.reset();
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        let template = match total {
            Some(_) => "{prefix} [{bar:30}] {percent:>3}% {msg}",
            None => "{prefix} {spinner} {msg}",
        };
        if let Ok(style) = ProgressStyle::with_template(template) {
            self.bar.set_style(style.progress_chars("=> "));
        }
        if let Some(total) = total {
            self.bar.set_length(total);
        }
        self.bar.set_position(resumed_from);
        let prefix = if resumed_from > 0 {
            format!("{} (resuming)", description)
        } else {
            description.to_string()
        };
        self.bar.set_prefix(prefix);
    }

    fn update(&self, snapshot: &ProgressSnapshot) {
        self.bar.set_position(snapshot.transferred);
        let mut msg = match snapshot.total {
            Some(total) => format!(
                "{}/{} {}/s",
                format_bytes(snapshot.transferred),
                format_bytes(total),
                format_bytes(snapshot.throughput as u64)
            ),
            None => format!(
                "{} {}/s",
                format_bytes(snapshot.transferred),
                format_bytes(snapshot.throughput as u64)
            ),
        };
        if let Some(eta) = snapshot.eta {
            msg.push_str(&format!(" ETA {}", format_duration(eta)));
        }
        self.bar.set_message(msg);
    }

    fn finish(&self, snapshot: &ProgressSnapshot) {
        self.bar.finish_and_clear();
        log::info!(
            "Downloaded {} in {} ({}/s)",
            format_bytes(snapshot.transferred),
            format_duration(snapshot.elapsed),
            format_bytes(snapshot.throughput as u64)
        );
    }
}
