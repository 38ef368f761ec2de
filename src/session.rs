//! Interval store for one build session
//!
//! A [`Session`] records when every unit of work began and finished,
//! relative to the session start. It owns everything the critical path
//! and report code reads: the finished intervals in finish order, the
//! dependency graph delivered at build completion, the resolved critical
//! path and the two usage time series.
//!
//! Mutating methods take `&mut self`: the host delivers build events from a
//! single stream. [`crate::monitor::BuildMonitor`] wraps a session in a lock
//! for hosts that read from other threads.

use crate::build_info::BuildInterval;
use crate::clock::{Clock, SystemClock};
use crate::critical_path::{find_critical_path, CriticalPathResult};
use crate::dependency_graph::DependencyGraph;
use crate::error::{MonitorError, Result};
use crate::usage::{UsageReading, UsageSample};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A unit that has begun but not finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InProgress {
    pub order_number: u32,

    /// Start offset from session start
    #[serde(rename = "begin_ms", with = "crate::serde_duration")]
    pub begin: Duration,
}

/// Recorded state of one build session
#[derive(Debug)]
pub struct Session {
    clock: Arc<dyn Clock>,
    name: String,
    started_at: DateTime<Local>,
    start: Instant,
    in_progress: HashMap<String, InProgress>,
    finished: Vec<BuildInterval>,
    dependencies: DependencyGraph,
    critical_path: Vec<BuildInterval>,
    max_concurrent: usize,
    last_order: u32,
    cpu_usage: Vec<UsageSample>,
    disk_usage: Vec<UsageSample>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create an empty session timed by the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty session timed by `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        let started_at = clock.wall_now();
        Self {
            clock,
            name: String::new(),
            started_at,
            start,
            in_progress: HashMap::new(),
            finished: Vec::new(),
            dependencies: DependencyGraph::new(),
            critical_path: Vec::new(),
            max_concurrent: 0,
            last_order: 0,
            cpu_usage: Vec::new(),
            disk_usage: Vec::new(),
        }
    }

    /// Forget every unit and restart the session clock
    ///
    /// The session name is kept; [`Session::begin_session`] replaces it.
    pub fn reset(&mut self) {
        self.in_progress.clear();
        self.finished.clear();
        self.dependencies = DependencyGraph::new();
        self.critical_path.clear();
        self.max_concurrent = 0;
        self.last_order = 0;
        self.cpu_usage.clear();
        self.disk_usage.clear();
        self.start = self.clock.now();
        self.started_at = self.clock.wall_now();
    }

    /// Reset and name a new session
    pub fn begin_session(&mut self, name: impl Into<String>) {
        self.reset();
        self.name = name.into();
        tracing::info!(session = %self.name, "build session started");
    }

    /// Offset of the clock's current time from session start
    pub fn now_offset(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.start)
    }

    /// Record that a unit began
    ///
    /// Beginning a unit that is already in progress restarts it under a new
    /// order number. A unit that already finished cannot begin again in the
    /// same session.
    ///
    /// # Returns
    ///
    /// The assigned order number, or `None` if the unit already finished.
    pub fn begin_unit(&mut self, id: &str) -> Option<u32> {
        if self.finished.iter().any(|b| b.id == id) {
            tracing::warn!(unit = %id, "unit began again after finishing, ignored");
            return None;
        }

        self.last_order += 1;
        let entry = InProgress {
            order_number: self.last_order,
            begin: self.now_offset(),
        };
        if self.in_progress.insert(id.to_string(), entry).is_some() {
            tracing::debug!(unit = %id, "unit began twice, start time overwritten");
        }

        self.max_concurrent = self.max_concurrent.max(self.in_progress.len());
        tracing::debug!(unit = %id, order_number = entry.order_number, "unit began");
        Some(entry.order_number)
    }

    /// Record that a unit finished
    ///
    /// # Errors
    ///
    /// [`MonitorError::FinishWithoutBegin`] if `id` is not in progress; the
    /// session is left unchanged.
    pub fn finish_unit(&mut self, id: &str, success: bool) -> Result<&BuildInterval> {
        let Some(started) = self.in_progress.remove(id) else {
            tracing::warn!(unit = %id, "unit finished without a matching begin");
            return Err(MonitorError::FinishWithoutBegin(id.to_string()));
        };

        let interval = BuildInterval::new(
            id,
            started.order_number,
            started.begin,
            self.now_offset(),
            success,
        );
        tracing::debug!(
            unit = %id,
            elapsed_ms = interval.elapsed().as_millis() as u64,
            success,
            "unit finished"
        );

        self.finished.push(interval);
        let index = self.finished.len() - 1;
        Ok(&self.finished[index])
    }

    /// How much of the observed parallel capacity was used, in percent
    ///
    /// Total unit time (finished intervals plus the running time of units
    /// still in progress) divided by the concurrency high-water mark, as a
    /// percentage of the span from the earliest finished begin to the
    /// latest end. While anything is in progress the span ends now.
    ///
    /// Returns 0 when nothing ran or the span is empty.
    pub fn percentage_utilization(&self) -> u64 {
        if self.max_concurrent == 0 {
            return 0;
        }

        let now = self.now_offset();
        let mut total = Duration::ZERO;
        let mut first_begin: Option<Duration> = None;
        let mut last_end = Duration::ZERO;

        for interval in &self.finished {
            total += interval.elapsed();
            first_begin = Some(first_begin.map_or(interval.begin, |b| b.min(interval.begin)));
            last_end = last_end.max(interval.end);
        }

        for running in self.in_progress.values() {
            total += now.saturating_sub(running.begin);
            last_end = now;
        }

        let span = last_end.saturating_sub(first_begin.unwrap_or(Duration::ZERO));
        if span.is_zero() {
            return 0;
        }

        let per_slot = total.as_millis() / self.max_concurrent as u128;
        let span_ms = span.as_millis().max(1);
        u64::try_from(per_slot * 100 / span_ms).unwrap_or(u64::MAX)
    }

    /// Store the dependency graph delivered at build completion
    pub fn set_dependencies(&mut self, dependencies: DependencyGraph) {
        self.dependencies = dependencies;
    }

    /// Resolve and store the critical path
    ///
    /// Returns false when there is nothing to chain (no finished units or
    /// no dependency graph); the stored path is then empty.
    pub fn resolve_critical_path(&mut self) -> bool {
        match find_critical_path(&self.finished, &self.dependencies) {
            Some(result) => {
                tracing::info!(
                    units = result.path.len(),
                    total_ms = result.total_elapsed().as_millis() as u64,
                    "critical path resolved"
                );
                self.critical_path = result.path;
                true
            }
            None => {
                self.critical_path.clear();
                false
            }
        }
    }

    /// Handle build completion: store the graph and optionally resolve
    /// the critical path
    ///
    /// Returns whether a critical path is available afterwards.
    pub fn finish_session(&mut self, dependencies: DependencyGraph, resolve: bool) -> bool {
        self.set_dependencies(dependencies);
        let resolved = resolve && self.resolve_critical_path();
        tracing::info!(
            session = %self.name,
            finished = self.finished.len(),
            still_running = self.in_progress.len(),
            "build session done"
        );
        resolved
    }

    /// Append one usage reading to both time series at the current offset
    pub fn record_usage(&mut self, reading: UsageReading) {
        let at = self.now_offset();
        self.cpu_usage.push(UsageSample {
            at,
            percent: reading.cpu_percent,
        });
        self.disk_usage.push(UsageSample {
            at,
            percent: reading.disk_percent,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock time of the last reset
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn in_progress(&self) -> &HashMap<String, InProgress> {
        &self.in_progress
    }

    /// Finished intervals in finish order
    pub fn finished(&self) -> &[BuildInterval] {
        &self.finished
    }

    /// Look up a finished interval by unit id
    pub fn find_finished(&self, id: &str) -> Option<&BuildInterval> {
        self.finished.iter().find(|b| b.id == id)
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Critical path in chronological order; empty until resolved
    pub fn critical_path(&self) -> &[BuildInterval] {
        &self.critical_path
    }

    /// Metrics over the stored critical path
    pub fn critical_path_result(&self) -> Option<CriticalPathResult> {
        (!self.critical_path.is_empty()).then(|| CriticalPathResult {
            path: self.critical_path.clone(),
        })
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn cpu_usage(&self) -> &[UsageSample] {
        &self.cpu_usage
    }

    pub fn disk_usage(&self) -> &[UsageSample] {
        &self.disk_usage
    }

    /// True if no finished unit failed
    pub fn all_succeeded(&self) -> bool {
        self.finished.iter().all(|b| b.success)
    }

    /// Span from session start to the last finished unit's end
    pub fn total_elapsed(&self) -> Duration {
        self.finished
            .iter()
            .map(|b| b.end)
            .max()
            .unwrap_or(Duration::ZERO)
    }

    /// Session description used as a report and chart title
    ///
    /// `"<name><sep>Build Started: 2024-03-01 14:05:09<sep><machine>"`;
    /// the `Build Started: ` label is left out unless requested and the
    /// machine part only appears when given.
    pub fn title(&self, separator: &str, with_started_label: bool, machine: Option<&str>) -> String {
        let mut title = String::new();
        if !self.name.is_empty() {
            title.push_str(&self.name);
            title.push_str(separator);
        }
        if with_started_label {
            title.push_str("Build Started: ");
        }
        title.push_str(&self.started_at.format("%Y-%m-%d %H:%M:%S").to_string());
        if let Some(machine) = machine.filter(|m| !m.is_empty()) {
            title.push_str(separator);
            title.push_str(machine);
        }
        title
    }

    /// Suggested base name for saved reports: `"PBM <name> 2024-03-01 14.05.09"`
    pub fn save_file_name_prefix(&self) -> String {
        format!(
            "PBM {} {}",
            self.name,
            self.started_at.format("%Y-%m-%d %H.%M.%S")
        )
    }

    /// Copy of the current state for readers on other threads
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut in_progress: Vec<InProgressUnit> = self
            .in_progress
            .iter()
            .map(|(id, p)| InProgressUnit {
                id: id.clone(),
                order_number: p.order_number,
                begin: p.begin,
            })
            .collect();
        in_progress.sort_by_key(|u| u.order_number);

        SessionSnapshot {
            name: self.name.clone(),
            started_at: self.started_at.to_rfc3339(),
            elapsed: self.now_offset(),
            in_progress,
            finished: self.finished.clone(),
            critical_path: self.critical_path.clone(),
            max_concurrent: self.max_concurrent,
            percentage_utilization: self.percentage_utilization(),
            all_succeeded: self.all_succeeded(),
            cpu_usage: self.cpu_usage.clone(),
            disk_usage: self.disk_usage.clone(),
        }
    }
}

/// An in-progress unit as it appears in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InProgressUnit {
    pub id: String,
    pub order_number: u32,
    #[serde(rename = "begin_ms", with = "crate::serde_duration")]
    pub begin: Duration,
}

/// Consistent point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub name: String,
    pub started_at: String,
    #[serde(rename = "elapsed_ms", with = "crate::serde_duration")]
    pub elapsed: Duration,
    /// Running units ordered by order number
    pub in_progress: Vec<InProgressUnit>,
    pub finished: Vec<BuildInterval>,
    pub critical_path: Vec<BuildInterval>,
    pub max_concurrent: usize,
    pub percentage_utilization: u64,
    pub all_succeeded: bool,
    pub cpu_usage: Vec<UsageSample>,
    pub disk_usage: Vec<UsageSample>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn session() -> (Arc<ManualClock>, Session) {
        let clock = Arc::new(ManualClock::new());
        let session = Session::with_clock(clock.clone());
        (clock, session)
    }

    #[test]
    fn test_begin_assigns_increasing_order_numbers() {
        let (_, mut s) = session();
        assert_eq!(s.begin_unit("a"), Some(1));
        assert_eq!(s.begin_unit("b"), Some(2));
        assert_eq!(s.begin_unit("c"), Some(3));
        assert_eq!(s.max_concurrent(), 3);
    }

    #[test]
    fn test_finish_records_relative_interval() {
        let (clock, mut s) = session();
        clock.set(ms(5));
        s.begin_unit("src\\core\\core.vcxproj");
        clock.set(ms(25));

        let interval = s.finish_unit("src\\core\\core.vcxproj", true).unwrap().clone();

        assert_eq!(interval.begin, ms(5));
        assert_eq!(interval.end, ms(25));
        assert_eq!(interval.order_number, 1);
        assert_eq!(interval.display_name, "core.vcxproj");
        assert!(s.in_progress().is_empty());
        assert_eq!(s.finished().len(), 1);
    }

    #[test]
    fn test_finish_without_begin_leaves_state_unchanged() {
        let (_, mut s) = session();
        s.begin_unit("a");

        let err = s.finish_unit("ghost", true).unwrap_err();

        assert!(matches!(err, MonitorError::FinishWithoutBegin(ref id) if id == "ghost"));
        assert_eq!(s.in_progress().len(), 1);
        assert!(s.finished().is_empty());
    }

    #[test]
    fn test_finish_twice_fails() {
        let (_, mut s) = session();
        s.begin_unit("a");
        s.finish_unit("a", true).unwrap();
        assert!(s.finish_unit("a", true).is_err());
        assert_eq!(s.finished().len(), 1);
    }

    #[test]
    fn test_begin_twice_overwrites_start() {
        let (clock, mut s) = session();
        s.begin_unit("a");
        clock.set(ms(40));
        assert_eq!(s.begin_unit("a"), Some(2));

        assert_eq!(s.in_progress().len(), 1);
        assert_eq!(s.in_progress()["a"].begin, ms(40));
        assert_eq!(s.max_concurrent(), 1);
    }

    #[test]
    fn test_begin_after_finish_rejected() {
        let (_, mut s) = session();
        s.begin_unit("a");
        s.finish_unit("a", true).unwrap();

        assert_eq!(s.begin_unit("a"), None);
        assert!(s.in_progress().is_empty());
    }

    #[test]
    fn test_max_concurrent_is_high_water_mark() {
        let (_, mut s) = session();
        s.begin_unit("a");
        s.begin_unit("b");
        s.finish_unit("a", true).unwrap();
        s.finish_unit("b", true).unwrap();
        s.begin_unit("c");

        assert_eq!(s.max_concurrent(), 2);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (clock, mut s) = session();
        s.begin_session("Debug|x64");
        s.begin_unit("a");
        s.begin_unit("b");
        s.finish_unit("a", true).unwrap();
        s.record_usage(UsageReading::default());

        clock.set(ms(1000));
        s.reset();

        assert!(s.in_progress().is_empty());
        assert!(s.finished().is_empty());
        assert!(s.critical_path().is_empty());
        assert!(s.cpu_usage().is_empty());
        assert_eq!(s.max_concurrent(), 0);
        assert_eq!(s.now_offset(), Duration::ZERO);
        assert_eq!(s.begin_unit("c"), Some(1));
    }

    #[test]
    fn test_utilization_sequential_units() {
        let (clock, mut s) = session();
        s.begin_unit("a");
        clock.set(ms(10));
        s.finish_unit("a", true).unwrap();
        clock.set(ms(20));
        s.begin_unit("b");
        clock.set(ms(100));
        s.finish_unit("b", true).unwrap();

        assert_eq!(s.max_concurrent(), 1);
        assert_eq!(s.percentage_utilization(), 90);
    }

    #[test]
    fn test_utilization_parallel_units() {
        let (clock, mut s) = session();
        s.begin_unit("a");
        s.begin_unit("b");
        clock.set(ms(100));
        s.finish_unit("a", true).unwrap();
        s.finish_unit("b", true).unwrap();

        assert_eq!(s.percentage_utilization(), 100);
    }

    #[test]
    fn test_utilization_counts_running_units() {
        let (clock, mut s) = session();
        s.begin_unit("a");
        clock.set(ms(50));
        s.finish_unit("a", true).unwrap();
        s.begin_unit("b");
        clock.set(ms(100));

        // (50 + 50) / 1 * 100 / 100
        assert_eq!(s.percentage_utilization(), 100);
    }

    #[test]
    fn test_utilization_empty_session() {
        let (_, s) = session();
        assert_eq!(s.percentage_utilization(), 0);
    }

    #[test]
    fn test_utilization_zero_span() {
        let (_, mut s) = session();
        s.begin_unit("a");
        s.finish_unit("a", true).unwrap();
        assert_eq!(s.percentage_utilization(), 0);
    }

    #[test]
    fn test_finish_session_resolves_path() {
        let (clock, mut s) = session();
        s.begin_unit("core");
        clock.set(ms(10));
        s.finish_unit("core", true).unwrap();
        s.begin_unit("app");
        clock.set(ms(30));
        s.finish_unit("app", true).unwrap();

        let graph: DependencyGraph = vec![("app", vec!["core"]), ("core", vec![])]
            .into_iter()
            .collect();

        assert!(s.finish_session(graph, true));
        let names: Vec<&str> = s.critical_path().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(names, vec!["core", "app"]);
        assert_eq!(s.critical_path_result().unwrap().total_elapsed(), ms(30));
    }

    #[test]
    fn test_finish_session_without_resolution() {
        let (_, mut s) = session();
        s.begin_unit("a");
        s.finish_unit("a", true).unwrap();

        assert!(!s.finish_session(DependencyGraph::new(), true));
        assert!(!s.finish_session(vec![("a", Vec::<&str>::new())].into_iter().collect(), false));
        assert!(s.critical_path().is_empty());
        assert_eq!(s.dependencies().len(), 1);
    }

    #[test]
    fn test_all_succeeded() {
        let (_, mut s) = session();
        assert!(s.all_succeeded());
        s.begin_unit("a");
        s.begin_unit("b");
        s.finish_unit("a", true).unwrap();
        assert!(s.all_succeeded());
        s.finish_unit("b", false).unwrap();
        assert!(!s.all_succeeded());
    }

    #[test]
    fn test_record_usage_timestamps() {
        let (clock, mut s) = session();
        s.record_usage(UsageReading {
            cpu_percent: 10.0,
            disk_percent: 1.0,
        });
        clock.set(ms(1000));
        s.record_usage(UsageReading {
            cpu_percent: 90.0,
            disk_percent: 5.0,
        });

        assert_eq!(s.cpu_usage().len(), 2);
        assert_eq!(s.cpu_usage()[1].at, ms(1000));
        assert_eq!(s.disk_usage()[1].percent, 5.0);
    }

    #[test]
    fn test_title_and_file_prefix() {
        let wall = Local.with_ymd_and_hms(2024, 3, 1, 14, 5, 9).unwrap();
        let mut s = Session::with_clock(Arc::new(ManualClock::starting_at(wall)));
        s.begin_session("MySolution.sln");

        assert_eq!(
            s.title("  |  ", true, Some("Cores: 8")),
            "MySolution.sln  |  Build Started: 2024-03-01 14:05:09  |  Cores: 8"
        );
        assert_eq!(s.title(" ", false, None), "MySolution.sln 2024-03-01 14:05:09");
        assert_eq!(
            s.save_file_name_prefix(),
            "PBM MySolution.sln 2024-03-01 14.05.09"
        );
    }

    #[test]
    fn test_snapshot_is_consistent() {
        let (clock, mut s) = session();
        s.begin_unit("a");
        s.begin_unit("b");
        clock.set(ms(10));
        s.finish_unit("a", true).unwrap();

        let snap = s.snapshot();
        assert_eq!(snap.in_progress.len(), 1);
        assert_eq!(snap.in_progress[0].id, "b");
        assert_eq!(snap.finished.len(), 1);
        assert_eq!(snap.max_concurrent, 2);

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["elapsed_ms"], 10);
        assert_eq!(json["finished"][0]["end_ms"], 10);
    }
}
