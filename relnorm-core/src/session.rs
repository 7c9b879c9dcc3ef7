//! Session-level normalization counters.
//!
//! A normalization stage tracks how many decomposition attempts the user has
//! made and how long the stage has been running. The tracker is a cheaply
//! cloneable handle; the model only ever *reads* these values. Recording
//! attempts and starting/resetting the clock is the driving layer's job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SessionInner {
    attempts: AtomicU64,
    started: RwLock<Option<Instant>>,
}

/// Attempt counter and elapsed-time clock for one normalization stage.
#[derive(Debug, Clone)]
pub struct SessionTracker(Arc<SessionInner>);

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTracker {
    pub fn new() -> Self {
        SessionTracker(Arc::new(SessionInner {
            attempts: AtomicU64::new(0),
            started: RwLock::new(None),
        }))
    }

    /// Start the stage clock. Idempotent: a stage that is already running
    /// keeps its original start instant.
    pub fn start(&self) {
        if let Ok(mut started) = self.0.started.write() {
            if started.is_none() {
                *started = Some(Instant::now());
            }
        }
    }

    /// Clear the attempt count and stop the clock (stage finished).
    pub fn reset(&self) {
        self.0.attempts.store(0, Ordering::Relaxed);
        if let Ok(mut started) = self.0.started.write() {
            *started = None;
        }
    }

    /// Clear the attempt count but keep the clock running (stage advanced).
    pub fn reset_attempts(&self) {
        self.0.attempts.store(0, Ordering::Relaxed);
    }

    /// Record one decomposition attempt and return the new total.
    pub fn record_attempt(&self) -> u64 {
        self.0.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Attempts recorded so far.
    pub fn attempts(&self) -> u64 {
        self.0.attempts.load(Ordering::Relaxed)
    }

    /// Time since `start`, or zero when the clock never started.
    pub fn elapsed(&self) -> Duration {
        self.0
            .started
            .read()
            .ok()
            .and_then(|started| started.map(|s| s.elapsed()))
            .unwrap_or_default()
    }

    /// Elapsed whole seconds, as reported in review payloads.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs()
    }
}

/// Format a duration the way solver progress messages do: milliseconds
/// below one second, fractional seconds above.
pub fn format_duration_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{} ms", ms)
    } else {
        format!("{:.2} s", ms as f64 / 1000.0)
    }
}
