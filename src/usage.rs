//! CPU and disk usage time series
//!
//! How a percentage is measured is up to the host: it plugs in a
//! [`UsageSampler`]. [`PeriodicSampler`] calls it on a background thread
//! at a fixed interval and hands every reading to a sink (normally the
//! build monitor, which timestamps it and appends it to the session).

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One point of a usage time series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageSample {
    /// Offset from session start
    #[serde(rename = "at_ms", with = "crate::serde_duration")]
    pub at: Duration,

    /// Utilization in percent
    pub percent: f32,
}

/// A CPU and a disk reading taken at the same moment
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageReading {
    pub cpu_percent: f32,
    pub disk_percent: f32,
}

/// Source of usage readings (e.g. OS performance counters)
pub trait UsageSampler: Send {
    /// Take one reading
    fn sample(&mut self) -> UsageReading;
}

impl<F> UsageSampler for F
where
    F: FnMut() -> UsageReading + Send,
{
    fn sample(&mut self) -> UsageReading {
        self()
    }
}

/// Upper bound on how long `stop` waits for the sampling thread to notice
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Background thread calling a sampler at a fixed interval
///
/// The first reading is taken immediately on spawn. Sampling stops on
/// [`PeriodicSampler::stop`] or when the handle is dropped.
#[derive(Debug)]
pub struct PeriodicSampler {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PeriodicSampler {
    /// Spawn the sampling thread
    ///
    /// # Arguments
    ///
    /// * `interval` - Time between readings (a zero interval is raised to 1ms)
    /// * `sampler` - Source of readings
    /// * `sink` - Receives every reading, on the sampling thread
    pub fn spawn<S, F>(interval: Duration, mut sampler: S, sink: F) -> Self
    where
        S: UsageSampler + 'static,
        F: Fn(UsageReading) + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            let mut next = Instant::now();
            while !shutdown_clone.load(Ordering::SeqCst) {
                if Instant::now() >= next {
                    sink(sampler.sample());
                    next += interval;
                    continue;
                }
                let wait = next.saturating_duration_since(Instant::now());
                thread::sleep(wait.min(SHUTDOWN_POLL));
            }
        });

        Self {
            handle: Some(handle),
            shutdown,
        }
    }

    /// Stop sampling and wait for the thread to exit
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    /// Whether the sampling thread is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn shutdown_and_join(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("usage sampler thread panicked");
            }
        }
    }
}

impl Drop for PeriodicSampler {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// Average of a usage series, `None` if it is empty
pub fn average_percent(series: &[UsageSample]) -> Option<f32> {
    if series.is_empty() {
        return None;
    }
    let sum: f32 = series.iter().map(|s| s.percent).sum();
    Some(sum / series.len() as f32)
}

/// Highest sample of a usage series
pub fn peak(series: &[UsageSample]) -> Option<UsageSample> {
    series
        .iter()
        .copied()
        .max_by(|a, b| a.percent.total_cmp(&b.percent))
}
