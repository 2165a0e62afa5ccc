//! Lightweight wall-clock utilities.
//!
//! Used for two things: pacing simulated time against wall-clock time, and
//! measuring where runtime is spent. Measurement reporting can be enabled via
//! the `TI_TIMING` environment variable or programmatically.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static ENABLED: AtomicBool = AtomicBool::new(false);

/// Enable timing reports globally.
pub fn enable_timing() {
    ENABLED.store(true, Ordering::Relaxed);
}

/// Check if timing reports are enabled.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed) || std::env::var("TI_TIMING").is_ok()
}

/// A simple timer that measures elapsed wall-clock time.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    /// Create and start a new timer with the given label.
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    /// Seconds elapsed since the timer started. Always measured.
    pub fn elapsed_s(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Stop the timer and return elapsed time in seconds.
    /// If timing reports are disabled, returns None.
    pub fn stop(self) -> Option<f64> {
        is_enabled().then(|| self.elapsed_s())
    }

    /// Stop the timer and print the result if enabled.
    pub fn stop_and_print(self) {
        let label = self.label;
        if let Some(elapsed) = self.stop() {
            println!("[TIMING] {}: {:.3}s", label, elapsed);
        }
    }
}

/// Sleep for whatever is left of `simulated_s` after `elapsed_s` of wall
/// time has already been spent. Never sleeps a negative amount.
///
/// Returns the time actually slept, in seconds.
pub fn sleep_remaining(simulated_s: f64, elapsed_s: f64) -> f64 {
    let remaining = simulated_s - elapsed_s;
    if !(remaining.is_finite() && remaining > 0.0) {
        return 0.0;
    }
    std::thread::sleep(Duration::from_secs_f64(remaining));
    remaining
}

/// Accumulating timer for tracking total time across multiple calls.
pub struct AccumulatingTimer {
    total_ns: AtomicU64,
    count: AtomicU64,
}

impl Default for AccumulatingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl AccumulatingTimer {
    /// Create a new accumulating timer.
    pub const fn new() -> Self {
        Self {
            total_ns: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Record a timing measurement.
    pub fn record(&self, duration_s: f64) {
        let nanos = (duration_s * 1e9) as u64;
        self.total_ns.fetch_add(nanos, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total time spent (in seconds).
    pub fn total_seconds(&self) -> f64 {
        self.total_ns.load(Ordering::Relaxed) as f64 / 1e9
    }

    /// Get number of calls.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get average time per call (in seconds).
    pub fn average_seconds(&self) -> f64 {
        let count = self.count();
        if count > 0 {
            self.total_seconds() / count as f64
        } else {
            0.0
        }
    }

    /// Reset the timer.
    pub fn reset(&self) {
        self.total_ns.store(0, Ordering::Relaxed);
        self.count.store(0, Ordering::Relaxed);
    }
}

/// Process-wide integration timers.
pub mod step_timing {
    use super::AccumulatingTimer;

    /// Wall time per completed step (all stages and retries)
    pub static STEPS: AccumulatingTimer = AccumulatingTimer::new();
    /// Wall time inside model derivative evaluations
    pub static EVALUATIONS: AccumulatingTimer = AccumulatingTimer::new();
    /// Wall time spent sleeping for real-time pacing
    pub static PACING_SLEEP: AccumulatingTimer = AccumulatingTimer::new();

    /// Print integration timing summary.
    pub fn print_summary() {
        use super::is_enabled;
        if !is_enabled() {
            return;
        }

        println!("\n=== Integration Timing ===");
        for (label, timer) in [
            ("steps", &STEPS),
            ("evaluations", &EVALUATIONS),
            ("pacing sleep", &PACING_SLEEP),
        ] {
            let count = timer.count();
            if count > 0 {
                println!(
                    "{:<14} {} calls, {:.3}s total, {:.4}ms avg",
                    label,
                    count,
                    timer.total_seconds(),
                    timer.average_seconds() * 1000.0
                );
            }
        }
        println!("==========================\n");
    }
}
