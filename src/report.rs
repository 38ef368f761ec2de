//! Report aggregation: ranked task columns and dense per-unit rows
//!
//! Parsed timings are sparse: every unit reports only the tasks it ran.
//! The report needs one column per task name across all units, so the
//! totals decide the column order (largest first) and every unit becomes a
//! fixed-length row with explicit gaps.
//!
//! ```text
//! totals:  CL=7912  Link=628  CppClean=17  AssignCulture=0
//! columns: [CL, Link, CppClean, AssignCulture]
//!
//! unit 1 {CL=3956, Link=628, AssignCulture=0} → [3956, 628, -,  0]
//! unit 2 {CL=3956, CppClean=17, AssignCulture=0} → [3956, -, 17, 0]
//! ```

use crate::error::{MonitorError, Result};
use crate::timing_parser::{PerUnitDurations, TaskDurations, TimingParse};
use std::collections::{BTreeMap, HashMap};

/// Stable column ordering for task names
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnIndex {
    index: HashMap<String, usize>,
    names: Vec<String>,
}

impl ColumnIndex {
    /// Column names in column order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 0-based column of a task name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Number of columns
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if there are no columns
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One fixed-length row: a slot per column, `None` where the unit has no value
pub type DenseRow = Vec<Option<u64>>;

/// Unit order number → dense row
pub type DenseTable = BTreeMap<u32, DenseRow>;

/// Result of [`densify`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Densified {
    /// Best-effort table; every row has exactly one slot per column
    pub table: DenseTable,

    /// False if values were dropped because their task had no column
    /// (only when strict signaling is on)
    pub complete: bool,
}

/// Rank task names by total duration
///
/// Sorted by total **descending**, ties broken by name **ascending**.
/// Returns `None` when there are no totals.
///
/// # Example
///
/// ```
/// use buildmon::report::rank_columns;
/// use buildmon::timing_parser::TaskDurations;
///
/// let totals: TaskDurations = [("A", 111), ("B", 333), ("C", 222)]
///     .into_iter()
///     .map(|(k, v)| (k.to_string(), v))
///     .collect();
///
/// let columns = rank_columns(Some(&totals)).unwrap();
/// assert_eq!(columns.names(), &["B", "C", "A"]);
/// assert_eq!(columns.index_of("A"), Some(2));
/// ```
pub fn rank_columns(totals: Option<&TaskDurations>) -> Option<ColumnIndex> {
    let totals = totals?;

    let mut ranked: Vec<(&String, u64)> = totals.iter().map(|(k, v)| (k, *v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let names: Vec<String> = ranked.into_iter().map(|(name, _)| name.clone()).collect();
    let index = names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect();

    Some(ColumnIndex { index, names })
}

/// Turn sparse per-unit durations into dense rows ordered by `columns`
///
/// # Errors
///
/// [`MonitorError::MissingColumnIndex`] when `per_unit` has units but
/// `columns` is `None`: without a column mapping values would land in the
/// wrong columns.
///
/// # Partial results
///
/// A task missing from `columns` is dropped from its row. With `strict`
/// set, the result is then marked incomplete.
pub fn densify(
    per_unit: Option<&PerUnitDurations>,
    columns: Option<&ColumnIndex>,
    strict: bool,
) -> Result<Densified> {
    let per_unit = match per_unit {
        Some(p) if !p.is_empty() => p,
        _ => {
            return Ok(Densified {
                table: DenseTable::new(),
                complete: true,
            })
        }
    };

    let columns = columns.ok_or(MonitorError::MissingColumnIndex {
        units: per_unit.len(),
    })?;

    let mut complete = true;
    let mut table = DenseTable::new();

    for (&order_number, tasks) in per_unit {
        let mut row: DenseRow = vec![None; columns.len()];
        for (task, &ms) in tasks {
            match columns.index_of(task) {
                Some(idx) => row[idx] = Some(ms),
                None => {
                    tracing::warn!(
                        order_number,
                        task = %task,
                        "task missing from column index, value dropped from report"
                    );
                    if strict {
                        complete = false;
                    }
                }
            }
        }
        table.insert(order_number, row);
    }

    Ok(Densified { table, complete })
}

/// Ranked columns plus dense rows, ready for the report writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailedReport {
    pub columns: ColumnIndex,
    pub rows: DenseTable,
}

impl DetailedReport {
    /// Row of a unit, if it had a timing section
    pub fn row(&self, order_number: u32) -> Option<&DenseRow> {
        self.rows.get(&order_number)
    }
}

/// Build the detailed report for a parse result
///
/// # Returns
///
/// The report (if there is detailed data that can be placed in columns)
/// and whether everything was parsed and placed without loss.
pub fn detailed_report(parse: &TimingParse, strict: bool) -> (Option<DetailedReport>, bool) {
    let mut complete = parse.ok;

    let columns = rank_columns(parse.totals.as_ref());
    let rows = match densify(parse.per_unit.as_ref(), columns.as_ref(), strict) {
        Ok(densified) => {
            complete &= densified.complete;
            densified.table
        }
        Err(e) => {
            tracing::warn!("detailed report dropped: {}", e);
            return (None, false);
        }
    };

    let report = columns
        .filter(|_| !rows.is_empty())
        .map(|columns| DetailedReport { columns, rows });

    (report, complete)
}
