//! Build event log replay
//!
//! A recorded build is a JSON-lines file, one event per line, each
//! stamped with its offset from the start of the recording:
//!
//! ```text
//! {"at_ms":0,"event":"session_begin","name":"App.sln","started_at":"2024-03-01 14:05:09"}
//! {"at_ms":0,"event":"unit_begin","id":"src/core/core.vcxproj"}
//! {"at_ms":0,"event":"usage","cpu_percent":35.0,"disk_percent":4.5}
//! {"at_ms":4200,"event":"unit_done","id":"src/core/core.vcxproj","success":true}
//! {"at_ms":4300,"event":"session_done","dependencies":{"src/core/core.vcxproj":[]}}
//! ```
//!
//! Replay drives a [`BuildMonitor`] through a [`ManualClock`] set to each
//! event's offset, so the session ends up exactly as it would have in the
//! host. Blank lines and lines starting with `#` are skipped.

use crate::clock::ManualClock;
use crate::dependency_graph::DependencyGraph;
use crate::error::{MonitorError, Result};
use crate::monitor::BuildMonitor;
use crate::usage::UsageReading;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Format of the optional `started_at` wall-clock stamp
pub const STARTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One build lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    SessionBegin {
        name: String,
        /// Local wall-clock time of the session start
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<String>,
    },
    UnitBegin {
        id: String,
    },
    UnitDone {
        id: String,
        success: bool,
    },
    Usage {
        cpu_percent: f32,
        disk_percent: f32,
    },
    SessionDone {
        #[serde(default)]
        dependencies: DependencyGraph,
    },
    SolutionClosed,
}

/// An event and its offset from the start of the recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "at_ms", with = "crate::serde_duration")]
    pub at: Duration,

    #[serde(flatten)]
    pub event: BuildEvent,
}

/// Parse a JSON-lines event log
///
/// # Errors
///
/// [`MonitorError::EventParse`] with the 1-based line number of the first
/// line that is not a valid event.
pub fn parse_events(text: &str) -> Result<Vec<EventRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| MonitorError::EventParse {
                line: idx + 1,
                source,
            })
        })
        .collect()
}

/// Read and parse an event log file
pub fn read_events<P: AsRef<Path>>(path: P) -> Result<Vec<EventRecord>> {
    let text = fs::read_to_string(path)?;
    parse_events(&text)
}

/// Monitor state after a replay
#[derive(Debug)]
pub struct ReplayOutcome {
    pub monitor: BuildMonitor,

    /// Events the session accepted
    pub applied: usize,

    /// Events the session refused (finish without begin, begin after finish)
    pub rejected: usize,

    /// Whether the last `session_done` produced a critical path
    pub critical_path_found: bool,
}

/// Replay events through a fresh monitor
///
/// Events must be in recording order. A `started_at` on the first
/// `session_begin` anchors the wall clock used in titles and file names;
/// without one the current local time is used.
pub fn replay(events: &[EventRecord], find_critical_path: bool) -> ReplayOutcome {
    let clock = Arc::new(ManualClock::starting_at(wall_clock_base(events)));
    let monitor = BuildMonitor::with_clock(clock.clone());

    let mut applied = 0;
    let mut rejected = 0;
    let mut critical_path_found = false;

    for record in events {
        clock.set(record.at);

        let accepted = match &record.event {
            BuildEvent::SessionBegin { name, .. } => {
                monitor.on_session_begin(name);
                critical_path_found = false;
                true
            }
            BuildEvent::UnitBegin { id } => monitor.on_unit_begin(id).is_some(),
            BuildEvent::UnitDone { id, success } => monitor.on_unit_done(id, *success).is_ok(),
            BuildEvent::Usage {
                cpu_percent,
                disk_percent,
            } => {
                monitor.record_usage(UsageReading {
                    cpu_percent: *cpu_percent,
                    disk_percent: *disk_percent,
                });
                true
            }
            BuildEvent::SessionDone { dependencies } => {
                critical_path_found =
                    monitor.on_session_done(dependencies.clone(), find_critical_path);
                true
            }
            BuildEvent::SolutionClosed => {
                monitor.on_solution_closed();
                critical_path_found = false;
                true
            }
        };

        if accepted {
            applied += 1;
        } else {
            rejected += 1;
        }
    }

    tracing::debug!(applied, rejected, "event log replayed");

    ReplayOutcome {
        monitor,
        applied,
        rejected,
        critical_path_found,
    }
}

/// Wall time at offset zero of the recording
fn wall_clock_base(events: &[EventRecord]) -> DateTime<Local> {
    let anchored = events.iter().find_map(|record| match &record.event {
        BuildEvent::SessionBegin {
            started_at: Some(stamp),
            ..
        } => Some((record.at, stamp.as_str())),
        _ => None,
    });

    let Some((at, stamp)) = anchored else {
        return Local::now();
    };

    let parsed = NaiveDateTime::parse_from_str(stamp, STARTED_AT_FORMAT)
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest());
    let Some(started_at) = parsed else {
        tracing::warn!(started_at = %stamp, "unparseable session start time, using local time");
        return Local::now();
    };

    chrono::Duration::from_std(at)
        .ok()
        .and_then(|offset| started_at.checked_sub_signed(offset))
        .unwrap_or(started_at)
}
