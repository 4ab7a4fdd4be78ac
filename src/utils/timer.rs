//! Timer utilities
//!
//! Case stopwatch and the cancellable suite deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

/// Simple timer for measuring elapsed time
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
    label: String,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        Self {
            start: std::time::Instant::now(),
            label: label.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop timer and return elapsed milliseconds
    pub fn stop(self) -> u64 {
        let elapsed = self.elapsed();
        debug!("{}: {}ms", self.label, elapsed.as_millis());
        elapsed.as_millis() as u64
    }
}

/// Scale a limit in seconds by a per-mille multiplier
pub fn scale_timeout(seconds: Option<u64>, multiplier: u64) -> Option<Duration> {
    seconds.map(|s| Duration::from_millis(s.saturating_mul(multiplier)))
}

/// Suite-wide deadline.
///
/// A background task raises the fired flag when the deadline passes. The
/// run loop polls the flag between scripts and never blocks on it.
#[derive(Debug)]
pub struct SuiteTimer {
    fired: Arc<AtomicBool>,
    deadline: Option<Instant>,
    task: Option<JoinHandle<()>>,
}

impl SuiteTimer {
    /// Arm the deadline; `None` never fires. Must be called inside a Tokio
    /// runtime.
    pub fn arm(limit: Option<Duration>) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let Some(limit) = limit else {
            return Self {
                fired,
                deadline: None,
                task: None,
            };
        };

        let deadline = Instant::now() + limit;
        let flag = fired.clone();
        let task = tokio::spawn(async move {
            sleep_until(deadline).await;
            info!("Suite timeout after {:?}", limit);
            flag.store(true, Ordering::SeqCst);
        });

        Self {
            fired,
            deadline: Some(deadline),
            task: Some(task),
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm the deadline and drain a signal that was already posted.
    ///
    /// Returns whether a signal had to be drained.
    pub fn cancel(mut self) -> bool {
        self.disarm()
    }

    fn disarm(&mut self) -> bool {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        let drained = self.fired.swap(false, Ordering::SeqCst);
        if drained {
            debug!("Drained suite timeout signal");
        }
        drained
    }
}

impl Drop for SuiteTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
