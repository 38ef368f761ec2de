//! Critical path resolution for a finished solution build
//!
//! The **critical path** is the chain of units whose sequential dependency
//! delays determine the total build duration. Shortening a unit that is not
//! on it does not make the build finish earlier.
//!
//! # Algorithm: Backward Greedy Chaining
//!
//! Only finish order and the direct-predecessor graph are known, so the
//! chain is built backwards from the last unit to finish:
//!
//! ```text
//! 1. current = last finished unit
//! 2. loop:
//!      preds = finished predecessors of current
//!      if preds is empty: stop (current is a build root)
//!      current = argmin over preds of (current.begin - pred.end)
//! 3. reverse the chain (earliest first)
//! ```
//!
//! The chosen predecessor is the one that finished closest to the moment
//! `current` started, i.e. the one `current` was most likely waiting for.
//! The first predecessor with the minimal difference wins.
//!
//! # Example
//!
//! ```text
//! core   [0 ─────── 40]
//! net         [10 ── 30]
//! app                    [45 ───── 90]   depends on core, net
//!
//! app.begin - core.end = 5   ← chosen
//! app.begin - net.end  = 15
//!
//! Critical path: core → app
//! ```
//!
//! ```
//! use buildmon::build_info::BuildInterval;
//! use buildmon::critical_path::find_critical_path;
//! use buildmon::dependency_graph::DependencyGraph;
//! use std::time::Duration;
//!
//! let ms = Duration::from_millis;
//! let finished = vec![
//!     BuildInterval::new("net", 2, ms(10), ms(30), true),
//!     BuildInterval::new("core", 1, ms(0), ms(40), true),
//!     BuildInterval::new("app", 3, ms(45), ms(90), true),
//! ];
//! let graph: DependencyGraph = vec![
//!     ("app", vec!["core", "net"]),
//!     ("core", vec![]),
//!     ("net", vec![]),
//! ]
//! .into_iter()
//! .collect();
//!
//! let result = find_critical_path(&finished, &graph).unwrap();
//! assert_eq!(result.unit_names(), vec!["core", "app"]);
//! ```

use crate::build_info::BuildInterval;
use crate::dependency_graph::DependencyGraph;
use std::collections::HashSet;
use std::time::Duration;

/// Result of critical path analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalPathResult {
    /// Units on the critical path, earliest first
    pub path: Vec<BuildInterval>,
}

impl CriticalPathResult {
    /// Sum of the elapsed times of the units on the path
    pub fn total_elapsed(&self) -> Duration {
        self.path.iter().map(BuildInterval::elapsed).sum()
    }

    /// Wall-clock span from the first unit's begin to the last unit's end
    pub fn span(&self) -> Duration {
        match (self.path.first(), self.path.last()) {
            (Some(first), Some(last)) => last.end.saturating_sub(first.begin),
            _ => Duration::ZERO,
        }
    }

    /// Percentage of `total_build` spent inside critical path units
    ///
    /// # Returns
    ///
    /// Percentage (0.0 to 100.0 for consistent data)
    pub fn critical_path_percentage(&self, total_build: Duration) -> f64 {
        if total_build.is_zero() {
            return 0.0;
        }
        (self.total_elapsed().as_secs_f64() / total_build.as_secs_f64()) * 100.0
    }

    /// The longest unit on the critical path (biggest bottleneck)
    ///
    /// On ties the earliest unit wins.
    pub fn longest_unit(&self) -> Option<&BuildInterval> {
        self.path
            .iter()
            .rev()
            .max_by(|a, b| a.cmp_elapsed(b))
    }

    /// Check if a unit is on the critical path
    pub fn is_on_critical_path(&self, id: &str) -> bool {
        self.path.iter().any(|info| info.id == id)
    }

    /// 1-based position of a unit in the chronological chain
    pub fn position(&self, id: &str) -> Option<usize> {
        self.path.iter().position(|info| info.id == id).map(|i| i + 1)
    }

    /// Display names on the critical path, earliest first
    pub fn unit_names(&self) -> Vec<&str> {
        self.path.iter().map(|info| info.display_name.as_str()).collect()
    }
}

/// Find the critical path ending at the last unit to finish
///
/// `finished` is expected in finish order (the session appends units as
/// they complete); it is not assumed to be sorted by start time.
///
/// # Returns
///
/// `None` when there is nothing to chain: no finished units or an empty
/// dependency graph. This is a normal outcome, not an error.
///
/// # Data inconsistencies
///
/// Predecessors missing from `finished` are skipped. A unit without an
/// entry in `dependencies` is treated as a build root. A dependency cycle
/// ends the walk at the first unit already on the path, so each unit
/// appears at most once.
///
/// # Performance
///
/// - Time complexity: O(P · N) where P is the path length and N the
///   number of finished units (predecessor lookup is a linear scan)
pub fn find_critical_path(
    finished: &[BuildInterval],
    dependencies: &DependencyGraph,
) -> Option<CriticalPathResult> {
    let last = finished.last()?;
    if dependencies.is_empty() {
        return None;
    }

    let mut path = vec![last.clone()];

    // Single-project build: no edges to traverse
    if finished.len() == 1 {
        return Some(CriticalPathResult { path });
    }

    let mut visited: HashSet<&str> = HashSet::from([last.id.as_str()]);
    let mut current = last;
    loop {
        let Some(preds) = dependencies.predecessors(&current.id) else {
            tracing::debug!(unit = %current.id, "unit missing from dependency graph, treating as root");
            break;
        };
        if preds.is_empty() {
            break;
        }

        let Some(chosen) = closest_predecessor(current, preds, finished) else {
            break;
        };

        if !visited.insert(chosen.id.as_str()) {
            tracing::warn!(
                unit = %chosen.id,
                "dependency cycle detected, critical path truncated"
            );
            break;
        }

        path.push(chosen.clone());
        current = chosen;
    }

    path.reverse();
    Some(CriticalPathResult { path })
}

/// Pick the predecessor whose end is closest to `current`'s begin
///
/// The difference is signed: a predecessor that ended after `current`
/// began has a negative difference and is not excluded.
fn closest_predecessor<'a>(
    current: &BuildInterval,
    preds: &[String],
    finished: &'a [BuildInterval],
) -> Option<&'a BuildInterval> {
    let mut min_diff = i128::MAX;
    let mut chosen = None;

    for pred_id in preds {
        let Some(pred) = finished_unit(finished, pred_id) else {
            tracing::warn!(
                unit = %current.id,
                predecessor = %pred_id,
                "predecessor missing from finished units, critical path may be inaccurate"
            );
            continue;
        };

        let diff = signed_nanos(current.begin) - signed_nanos(pred.end);
        if diff < 0 {
            tracing::debug!(
                unit = %current.id,
                predecessor = %pred_id,
                "predecessor finished after unit began"
            );
        }
        if diff < min_diff {
            min_diff = diff;
            chosen = Some(pred);
        }
    }

    chosen
}

fn finished_unit<'a>(finished: &'a [BuildInterval], id: &str) -> Option<&'a BuildInterval> {
    finished.iter().find(|info| info.id == id)
}

fn signed_nanos(d: Duration) -> i128 {
    i128::try_from(d.as_nanos()).unwrap_or(i128::MAX)
}
