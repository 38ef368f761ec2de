//! Host-facing build monitor
//!
//! The host forwards its build lifecycle notifications here. The session
//! sits behind a read/write lock so a renderer on another thread can take
//! snapshots while build events keep arriving; every snapshot sees either
//! the state before or after an event, never a unit half-moved from
//! in-progress to finished.
//!
//! # Example
//!
//! ```
//! use buildmon::clock::ManualClock;
//! use buildmon::dependency_graph::DependencyGraph;
//! use buildmon::monitor::BuildMonitor;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let clock = Arc::new(ManualClock::new());
//! let monitor = BuildMonitor::with_clock(clock.clone());
//!
//! monitor.on_session_begin("App.sln");
//! monitor.on_unit_begin("core.vcxproj");
//! clock.advance(Duration::from_millis(200));
//! monitor.on_unit_done("core.vcxproj", true).unwrap();
//!
//! let graph: DependencyGraph = vec![("core.vcxproj", Vec::<&str>::new())].into_iter().collect();
//! assert!(monitor.on_session_done(graph, true));
//! assert_eq!(monitor.snapshot().critical_path.len(), 1);
//! ```

use crate::build_info::BuildInterval;
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::dependency_graph::DependencyGraph;
use crate::error::Result;
use crate::session::{Session, SessionSnapshot};
use crate::usage::{PeriodicSampler, UsageReading, UsageSampler};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

type SharedSampler = Arc<Mutex<dyn UsageSampler>>;

/// Build lifecycle handler owning one session
pub struct BuildMonitor {
    session: Arc<RwLock<Session>>,
    sample_interval: Duration,
    sampler: Option<SharedSampler>,
    sampling: Mutex<Option<PeriodicSampler>>,
}

impl std::fmt::Debug for BuildMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildMonitor")
            .field("session", &self.session)
            .field("sample_interval", &self.sample_interval)
            .field("has_sampler", &self.sampler.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for BuildMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildMonitor {
    /// Monitor timed by the system clock, without usage sampling
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Monitor timed by `clock` with default settings, without usage sampling
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, &MonitorConfig::default())
    }

    /// Monitor timed by `clock`, sampling at `config.sample_interval_ms`
    /// once a sampler is attached
    pub fn with_config(clock: Arc<dyn Clock>, config: &MonitorConfig) -> Self {
        Self {
            session: Arc::new(RwLock::new(Session::with_clock(clock))),
            sample_interval: config.sample_interval(),
            sampler: None,
            sampling: Mutex::new(None),
        }
    }

    /// Sample CPU and disk usage while a session runs
    pub fn with_sampler<S>(mut self, sampler: S) -> Self
    where
        S: UsageSampler + 'static,
    {
        let sampler: SharedSampler = Arc::new(Mutex::new(sampler));
        self.sampler = Some(sampler);
        self
    }

    /// Period of the usage sampler
    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// A new build session started: reset and start sampling
    pub fn on_session_begin(&self, name: &str) {
        self.stop_sampling();
        self.write().begin_session(name);
        self.start_sampling();
    }

    /// A unit began building
    pub fn on_unit_begin(&self, id: &str) -> Option<u32> {
        self.write().begin_unit(id)
    }

    /// A unit finished building
    ///
    /// # Errors
    ///
    /// Fails without touching the session when the unit never began.
    pub fn on_unit_done(&self, id: &str, success: bool) -> Result<BuildInterval> {
        self.write().finish_unit(id, success).cloned()
    }

    /// The build finished: stop sampling, store the dependency graph and
    /// resolve the critical path if requested
    ///
    /// Returns whether a critical path is available.
    pub fn on_session_done(&self, dependencies: DependencyGraph, find_critical_path: bool) -> bool {
        self.stop_sampling();
        self.write().finish_session(dependencies, find_critical_path)
    }

    /// The solution was closed: drop all recorded data
    pub fn on_solution_closed(&self) {
        self.stop_sampling();
        self.write().reset();
        tracing::debug!("solution closed, session reset");
    }

    /// Append a usage reading at the current session offset
    pub fn record_usage(&self, reading: UsageReading) {
        self.write().record_usage(reading);
    }

    /// Point-in-time copy of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.read().snapshot()
    }

    pub fn percentage_utilization(&self) -> u64 {
        self.read().percentage_utilization()
    }

    /// Run `f` with shared access to the session
    pub fn with_session<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.read())
    }

    /// Whether the usage sampler thread is running
    pub fn is_sampling(&self) -> bool {
        self.sampling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PeriodicSampler::is_running)
    }

    fn start_sampling(&self) {
        let Some(sampler) = self.sampler.clone() else {
            return;
        };
        let session = Arc::clone(&self.session);

        let periodic = PeriodicSampler::spawn(
            self.sample_interval,
            move || sampler.lock().unwrap_or_else(PoisonError::into_inner).sample(),
            move |reading| {
                session
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record_usage(reading)
            },
        );

        *self.sampling.lock().unwrap_or_else(PoisonError::into_inner) = Some(periodic);
    }

    fn stop_sampling(&self) {
        let running = self
            .sampling
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(periodic) = running {
            periodic.stop();
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BuildMonitor {
    fn drop(&mut self) {
        self.stop_sampling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::thread;
    use std::time::Instant;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_lifecycle() {
        let clock = Arc::new(ManualClock::new());
        let monitor = BuildMonitor::with_clock(clock.clone());

        monitor.on_session_begin("App.sln");
        assert_eq!(monitor.on_unit_begin("core"), Some(1));
        assert_eq!(monitor.on_unit_begin("net"), Some(2));
        clock.set(ms(100));
        monitor.on_unit_done("core", true).unwrap();
        monitor.on_unit_done("net", true).unwrap();
        monitor.on_unit_begin("app");
        clock.set(ms(150));
        monitor.on_unit_done("app", true).unwrap();

        let graph: DependencyGraph = vec![
            ("app", vec!["core", "net"]),
            ("core", vec![]),
            ("net", vec![]),
        ]
        .into_iter()
        .collect();
        assert!(monitor.on_session_done(graph, true));

        let snap = monitor.snapshot();
        assert_eq!(snap.name, "App.sln");
        assert_eq!(snap.finished.len(), 3);
        assert_eq!(snap.critical_path.len(), 2);
        assert_eq!(snap.critical_path[1].id, "app");
        assert_eq!(snap.max_concurrent, 2);
    }

    #[test]
    fn test_unit_done_without_begin_is_not_fatal() {
        let monitor = BuildMonitor::with_clock(Arc::new(ManualClock::new()));
        monitor.on_session_begin("App.sln");

        assert!(monitor.on_unit_done("ghost", false).is_err());
        assert!(monitor.snapshot().finished.is_empty());
    }

    #[test]
    fn test_solution_closed_resets() {
        let monitor = BuildMonitor::with_clock(Arc::new(ManualClock::new()));
        monitor.on_session_begin("App.sln");
        monitor.on_unit_begin("core");

        monitor.on_solution_closed();

        assert!(monitor.snapshot().in_progress.is_empty());
        assert_eq!(monitor.with_session(|s| s.max_concurrent()), 0);
    }

    fn sampling_config(interval_ms: u64) -> MonitorConfig {
        MonitorConfig {
            sample_interval_ms: interval_ms,
            ..MonitorConfig::default()
        }
    }

    fn constant_reading() -> UsageReading {
        UsageReading {
            cpu_percent: 55.0,
            disk_percent: 3.0,
        }
    }

    #[test]
    fn test_sample_interval_from_config() {
        let clock = Arc::new(ManualClock::new());
        assert_eq!(BuildMonitor::with_clock(clock.clone()).sample_interval(), ms(1000));

        let monitor = BuildMonitor::with_config(clock, &sampling_config(250));
        assert_eq!(monitor.sample_interval(), ms(250));
    }

    #[test]
    fn test_configured_interval_drives_sampler() {
        let fast = BuildMonitor::with_config(Arc::new(ManualClock::new()), &sampling_config(1))
            .with_sampler(constant_reading);
        let slow = BuildMonitor::with_config(Arc::new(ManualClock::new()), &sampling_config(60_000))
            .with_sampler(constant_reading);

        fast.on_session_begin("App.sln");
        slow.on_session_begin("App.sln");

        // A one second default period could not produce three readings here
        let deadline = Instant::now() + ms(500);
        while fast.snapshot().cpu_usage.len() < 3 && Instant::now() < deadline {
            thread::sleep(ms(1));
        }
        assert!(fast.snapshot().cpu_usage.len() >= 3);

        // Only the reading taken at start
        let deadline = Instant::now() + Duration::from_secs(5);
        while slow.snapshot().cpu_usage.is_empty() && Instant::now() < deadline {
            thread::sleep(ms(1));
        }
        thread::sleep(ms(20));
        assert_eq!(slow.snapshot().cpu_usage.len(), 1);

        fast.on_solution_closed();
        slow.on_solution_closed();
    }

    #[test]
    fn test_sampling_runs_between_begin_and_done() {
        let monitor = BuildMonitor::with_config(Arc::new(ManualClock::new()), &sampling_config(1))
            .with_sampler(constant_reading);

        monitor.on_session_begin("App.sln");
        assert!(monitor.is_sampling());

        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.snapshot().cpu_usage.is_empty() && Instant::now() < deadline {
            thread::sleep(ms(1));
        }
        assert!(!monitor.on_session_done(DependencyGraph::new(), true));
        assert!(!monitor.is_sampling());

        let samples = monitor.snapshot().cpu_usage.len();
        assert!(samples >= 1);
        thread::sleep(ms(10));
        assert_eq!(monitor.snapshot().cpu_usage.len(), samples);
        assert_eq!(monitor.snapshot().cpu_usage[0].percent, 55.0);
    }

    #[test]
    fn test_concurrent_snapshots_never_tear() {
        let monitor = Arc::new(BuildMonitor::with_clock(Arc::new(ManualClock::new())));
        monitor.on_session_begin("App.sln");

        let reader = {
            let monitor = Arc::clone(&monitor);
            thread::spawn(move || {
                for _ in 0..200 {
                    let snap = monitor.snapshot();
                    for unit in &snap.in_progress {
                        assert!(snap.finished.iter().all(|f| f.id != unit.id));
                    }
                }
            })
        };

        for i in 0..200 {
            let id = format!("unit{i}");
            monitor.on_unit_begin(&id);
            monitor.on_unit_done(&id, true).unwrap();
        }
        reader.join().unwrap();

        assert_eq!(monitor.snapshot().finished.len(), 200);
    }
}
