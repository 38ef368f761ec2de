//! Build-timing text parser
//!
//! MSBuild prints a per-project "Task Performance Summary" into the build
//! output when detailed build timing is enabled:
//!
//! ```text
//! 1>Task Performance Summary:
//! 1>        0 ms  AssignCulture                              1 calls
//! 1>      628 ms  Link                                       1 calls
//! 1>     3956 ms  CL                                         2 calls
//!
//! 2>Task Performance Summary:
//! 2>       17 ms  CppClean                                   1 calls
//! ```
//!
//! The number before `>` is the unit's order number. Every following line
//! containing ` ms ` is a data row (`<prefix> <duration> ms <task> ...`);
//! the first line without it closes the section.
//!
//! Parsing never aborts. Malformed input clears [`TimingParse::ok`] and
//! processing continues with the next line.

use std::collections::{BTreeMap, HashSet};

/// Marker phrase that opens a section
pub const SECTION_MARKER: &str = "Task Performance Summary";

/// Substring that identifies a data row
const ROW_MARKER: &str = " ms ";

/// Task name → duration in milliseconds
pub type TaskDurations = BTreeMap<String, u64>;

/// Unit order number → task durations of that unit
pub type PerUnitDurations = BTreeMap<u32, TaskDurations>;

/// Outcome of parsing one block of build output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingParse {
    /// Per-unit task durations; `None` if no section was collected
    pub per_unit: Option<PerUnitDurations>,

    /// Task durations summed over every collected section; `None` if empty
    pub totals: Option<TaskDurations>,

    /// False if any header, row or section was malformed or truncated
    pub ok: bool,
}

impl TimingParse {
    fn empty() -> Self {
        Self {
            per_unit: None,
            totals: None,
            ok: true,
        }
    }

    /// Number of units with a collected section
    pub fn unit_count(&self) -> usize {
        self.per_unit.as_ref().map_or(0, BTreeMap::len)
    }
}

struct OpenSection {
    order_number: u32,
    tasks: TaskDurations,
}

/// Parse task performance summaries out of build output text
///
/// # Arguments
///
/// * `text` - Build output; `None` or empty means no timing was requested
/// * `only` - When non-empty, only sections whose order number is in the
///   set are collected; other sections are skipped without affecting `ok`
///
/// # Example
///
/// ```
/// use buildmon::timing_parser::parse_build_timings;
/// use std::collections::HashSet;
///
/// let text = "1>Task Performance Summary:\n1> 628 ms Link 1 calls\n";
/// let parsed = parse_build_timings(Some(text), &HashSet::new());
///
/// assert!(parsed.ok);
/// assert_eq!(parsed.per_unit.unwrap()[&1]["Link"], 628);
/// assert_eq!(parsed.totals.unwrap()["Link"], 628);
/// ```
pub fn parse_build_timings(text: Option<&str>, only: &HashSet<u32>) -> TimingParse {
    let text = match text {
        Some(t) if !t.is_empty() => t,
        _ => return TimingParse::empty(),
    };

    let mut ok = true;
    let mut per_unit = PerUnitDurations::new();
    let mut totals = TaskDurations::new();
    let mut open: Option<OpenSection> = None;

    for raw in text.split('\n') {
        let line = raw.strip_suffix('\r').unwrap_or(raw);

        if line.contains(SECTION_MARKER) {
            if let Some(section) = open.take() {
                close_section(section, &mut per_unit, &mut totals);
            }

            match section_order_number(line) {
                Some(order_number) => {
                    if only.is_empty() || only.contains(&order_number) {
                        open = Some(OpenSection {
                            order_number,
                            tasks: TaskDurations::new(),
                        });
                    }
                }
                None => {
                    tracing::debug!(line = %line, "unparseable task performance header");
                    ok = false;
                }
            }
            continue;
        }

        if !line.contains(ROW_MARKER) {
            if let Some(section) = open.take() {
                close_section(section, &mut per_unit, &mut totals);
            }
            continue;
        }

        if let Some(section) = open.as_mut() {
            match parse_row(line) {
                Some((task, ms)) => {
                    section.tasks.insert(task.to_string(), ms);
                }
                None => {
                    tracing::debug!(line = %line, "malformed task performance row");
                    ok = false;
                }
            }
        }
    }

    if let Some(section) = open {
        tracing::debug!(
            order_number = section.order_number,
            "task performance section truncated"
        );
        ok = false;
    }

    if per_unit.is_empty() != totals.is_empty() {
        tracing::warn!("sections without task rows; detailed report will be incomplete");
    }

    TimingParse {
        per_unit: (!per_unit.is_empty()).then_some(per_unit),
        totals: (!totals.is_empty()).then_some(totals),
        ok,
    }
}

fn close_section(section: OpenSection, per_unit: &mut PerUnitDurations, totals: &mut TaskDurations) {
    for (task, ms) in &section.tasks {
        let sum = totals.entry(task.clone()).or_insert(0);
        *sum = sum.saturating_add(*ms);
    }
    per_unit.insert(section.order_number, section.tasks);
}

/// Order number in front of the first `>` of a header line
fn section_order_number(line: &str) -> Option<u32> {
    let idx = line.find('>')?;
    line[..idx].trim().parse().ok()
}

/// `(task, duration_ms)` from a data row
///
/// Durations are unsigned; a negative value makes the row malformed.
fn parse_row(line: &str) -> Option<(&str, u64)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return None;
    }
    let ms = tokens[1].parse().ok()?;
    Some((tokens[3], ms))
}
